use std::{
    env,
    path::Path,
    process::ExitCode,
    sync::mpsc::TryRecvError,
    thread,
    time::{Duration, Instant},
};

use log::{error, info, warn};
use storyline_core::{
    command::{handle_json_request, handle_serial_line},
    controller::StoryController,
    resources::ResourceStore,
    runtime::PortableRuntime,
};
use storyline_hal_std::{
    host::SimulatedAppHost,
    storage::{StdResourceFs, seal_tree},
};

use settings::Settings;

#[path = "main/console.rs"]
mod console;
#[path = "main/settings.rs"]
mod settings;

type Runtime = PortableRuntime<StdResourceFs, SimulatedAppHost>;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        None => run(settings),
        Some("seal") => {
            let root = args.next().unwrap_or(settings.root);
            seal(Path::new(&root))
        }
        Some(other) => {
            error!("boot: unknown argument {:?}; usage: storyline [seal [root]]", other);
            ExitCode::FAILURE
        }
    }
}

fn seal(root: &Path) -> ExitCode {
    match seal_tree(root) {
        Ok(report) => {
            info!(
                "seal: root={} written={}/{}",
                root.display(),
                report.written,
                report.scanned
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("seal: failed root={} err={}", root.display(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: Settings) -> ExitCode {
    info!(
        "boot: storyline starting root={} strict_fs={} fallback={}",
        settings.root, settings.runtime.strict_fs_only, settings.runtime.allow_generated_fallback
    );

    let store = ResourceStore::new(StdResourceFs::default(), &settings.root);
    let controller = StoryController::new(SimulatedAppHost::new(settings.host), settings.controller);
    let mut runtime = Runtime::new(store, controller, settings.runtime);

    let console = match console::spawn() {
        Ok(console) => console,
        Err(err) => {
            error!("boot: console thread failed err={}", err);
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let boot = match settings.scenario.as_deref() {
        Some(id) => runtime.set_scenario(id, now_ms(start), "boot"),
        None => runtime.begin(now_ms(start)),
    };
    if let Err(err) = boot {
        warn!("boot: no scenario running code={} err={}", err.as_code(), err);
    }
    info!("boot: {} scenarios available", runtime.list_scenarios().len());

    let tick = Duration::from_millis(settings.tick_ms);
    'run: loop {
        let now = now_ms(start);
        loop {
            match console.try_recv() {
                Ok(line) => {
                    if !handle_line(&mut runtime, &line, now) {
                        break 'run;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'run,
            }
        }

        runtime.update(now);
        thread::sleep(tick);
    }

    runtime.stop("shutdown");
    ExitCode::SUCCESS
}

/// Returns `false` when the console asked to quit.
fn handle_line(runtime: &mut Runtime, line: &str, now_ms: u32) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    if line.eq_ignore_ascii_case("QUIT") {
        return false;
    }

    if line.starts_with('{') {
        println!("{}", handle_json_request(runtime, line, now_ms).to_json());
    } else {
        println!("{}", handle_serial_line(runtime, line, now_ms).to_serial_line());
    }
    true
}

/// Milliseconds since boot on the same wrapping `u32` clock the firmware uses.
fn now_ms(start: Instant) -> u32 {
    start.elapsed().as_millis() as u32
}
