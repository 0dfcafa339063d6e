//! Hardware the node reports when asking for a plan.

use std::path::Path;

use thatdam_supervisor::api::Capabilities;

/// Scan a device directory (normally `/dev`) for `video*` nodes and GPU
/// devices (`nvidia*` or `dri`). Unreadable directories report nothing.
pub fn probe_capabilities(dev_dir: &Path) -> Capabilities {
    let Ok(entries) = std::fs::read_dir(dev_dir) else {
        return Capabilities::default();
    };

    let mut video_devices = Vec::new();
    let mut gpu = false;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("video") {
            video_devices.push(entry.path().display().to_string());
        } else if name.starts_with("nvidia") || name == "dri" {
            gpu = true;
        }
    }
    video_devices.sort();
    Capabilities { video_devices, gpu }
}

/// Capabilities of this host.
pub fn probe_host() -> Capabilities {
    probe_capabilities(Path::new("/dev"))
}
