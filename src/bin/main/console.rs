use std::{
    io::{self, BufRead},
    sync::mpsc::{self, Receiver},
    thread,
};

use log::warn;

/// Read stdin on its own thread. The receiver disconnects at EOF.
pub(super) fn spawn() -> io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("console: read failed err={}", err);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}
