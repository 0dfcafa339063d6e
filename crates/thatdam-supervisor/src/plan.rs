//! Plan selection for `POST /v1/nodes/plan`.

use serde::Deserialize;
use serde::Serialize;

/// Hardware a node reports when asking for a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub video_devices: Vec<String>,
    #[serde(default)]
    pub gpu: bool,
}

pub const SERVER_TEMPLATE: &str = "server";
pub const CAMERA_PROXY_TEMPLATE: &str = "camera-proxy";

/// Template to render for a node, or `None` for an empty plan.
///
/// An explicit `server` hint wins. A proxy hint or any video device selects
/// the camera proxy, which anonymous callers only get when allowed.
pub fn select_template(
    role_hint: &str,
    caps: &Capabilities,
    anonymous: bool,
    allow_anonymous_proxy: bool,
) -> Option<&'static str> {
    let hint = role_hint.trim().to_ascii_lowercase();
    if hint == SERVER_TEMPLATE {
        return Some(SERVER_TEMPLATE);
    }
    let wants_proxy = hint == "proxy" || hint == CAMERA_PROXY_TEMPLATE || !caps.video_devices.is_empty();
    if wants_proxy && (!anonymous || allow_anonymous_proxy) {
        return Some(CAMERA_PROXY_TEMPLATE);
    }
    None
}
