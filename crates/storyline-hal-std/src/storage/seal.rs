use std::{fs, io, path::Path};

use log::{debug, info};
use storyline_core::resources::{ResourceKind, SIDECAR_SUFFIX, checksum_matches, sha256_hex};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SealReport {
    pub scanned: usize,
    pub written: usize,
    pub unchanged: usize,
}

/// Write a `.sha256` sidecar next to every `.json` resource under `root`
/// whose sidecar is missing or stale. Missing resource directories are
/// skipped.
pub fn seal_tree(root: &Path) -> io::Result<SealReport> {
    let mut report = SealReport::default();

    for kind in ResourceKind::ALL {
        let dir = root.join(kind.dir());
        if !dir.is_dir() {
            debug!("seal: skip missing dir={}", dir.display());
            continue;
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort_unstable();

        for path in paths {
            report.scanned += 1;
            let digest = sha256_hex(&fs::read(&path)?);

            let mut sidecar = path.clone().into_os_string();
            sidecar.push(SIDECAR_SUFFIX);
            let current = match fs::read(&sidecar) {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == io::ErrorKind::NotFound => None,
                Err(err) => return Err(err),
            };

            if current.is_some_and(|bytes| checksum_matches(&bytes, &digest)) {
                report.unchanged += 1;
                continue;
            }

            fs::write(&sidecar, format!("{digest}\n"))?;
            report.written += 1;
            info!("seal: wrote path={} sha256={}", path.display(), digest);
        }
    }

    info!(
        "seal: done scanned={} written={} unchanged={}",
        report.scanned, report.written, report.unchanged
    );
    Ok(report)
}
