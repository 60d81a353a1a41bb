//! Discovery of a usable graphical display environment.
//!
//! When this process is started from a background service manager it has no
//! desktop session context: no `DISPLAY`, no `XAUTHORITY`. A headful browser
//! launched from such a process is refused by the display server. The
//! resolver recovers a plausible environment by scanning the process table
//! for a running desktop session and adopting its environment block.
//!
//! Resolution is a one-shot, best-effort heuristic. It never fails; at worst
//! it degrades to the caller's own environment plus the conventional `:0`
//! display address.

use std::collections::HashMap;
use std::path::PathBuf;

use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Conventional display address used when discovery comes up empty.
pub const DEFAULT_DISPLAY: &str = ":0";

/// Window managers and compositors. A live one of these is the strongest
/// signal: it is guaranteed to hold a working display connection.
const WINDOW_MANAGERS: &[&str] = &[
    "gnome-shell",
    "kwin_wayland",
    "kwin_x11",
    "plasmashell",
    "sway",
    "mutter",
    "i3",
    "xfwm4",
    "cinnamon",
    "openbox",
];

/// Session managers. Weaker than a window manager (they can outlive a dead
/// display) but still carry the session environment.
const SESSION_MANAGERS: &[&str] = &[
    "gnome-session",
    "xfce4-session",
    "plasma_session",
    "lxsession",
    "mate-session",
];

/// Raw display servers, the last resort. Their environment is often sparse
/// but their presence at least confirms a display exists.
const DISPLAY_SERVERS: &[&str] = &["Xorg", "Xwayland", "weston", "X"];

/// Variables copied onto this process before launching the browser so the
/// child inherits the discovered session. Anything outside this set stays
/// untouched to keep the agent's own PATH/HOME intact.
const SESSION_ENV_KEYS: &[&str] = &[
    "DISPLAY",
    "WAYLAND_DISPLAY",
    "XAUTHORITY",
    "XDG_RUNTIME_DIR",
    "DBUS_SESSION_BUS_ADDRESS",
];

/// Kernel comm names are truncated to 15 bytes.
const MAX_COMM_LEN: usize = 15;

/// An environment-variable mapping suitable for launching a graphical child.
pub type DisplayEnv = HashMap<String, String>;

/// One row of a process-table snapshot: the process name and its
/// environment block.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub name: String,
    pub environ: HashMap<String, String>,
}

impl ProcessEntry {
    pub fn new(name: impl Into<String>, environ: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            environ,
        }
    }
}

fn matches_name(process_name: &str, candidate: &str) -> bool {
    process_name == candidate
        || (process_name.len() == MAX_COMM_LEN && process_name.starts_with(candidate))
}

/// Find the best session-bearing process: window manager first, then session
/// manager, then a raw display server. Tier order beats table order.
fn find_session_process<'a>(table: &'a [ProcessEntry]) -> Option<&'a ProcessEntry> {
    for tier in [WINDOW_MANAGERS, SESSION_MANAGERS, DISPLAY_SERVERS] {
        if let Some(entry) = table
            .iter()
            .find(|p| tier.iter().any(|c| matches_name(&p.name, c)))
        {
            return Some(entry);
        }
    }
    None
}

/// Resolution core over an explicit snapshot. The discovered session
/// environment is merged over `base` (session wins on conflicts), and the
/// output is guaranteed to contain a `DISPLAY` entry.
pub fn resolve_with(table: &[ProcessEntry], base: &DisplayEnv) -> DisplayEnv {
    let mut env = base.clone();

    match find_session_process(table) {
        Some(entry) => {
            debug!(process = %entry.name, "adopting environment of running session process");
            for (key, value) in &entry.environ {
                if key.is_empty() {
                    continue;
                }
                env.insert(key.clone(), value.clone());
            }
        }
        None => {
            debug!("no desktop session process found; keeping caller environment");
        }
    }

    env.entry("DISPLAY".to_string())
        .or_insert_with(|| DEFAULT_DISPLAY.to_string());
    env
}

/// Fixed ordered list of places an X authority cookie file is commonly found.
fn xauthority_candidates(env: &DisplayEnv) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = env.get("HOME").map(PathBuf::from).or_else(dirs::home_dir) {
        candidates.push(home.join(".Xauthority"));
    }
    if let Some(runtime_dir) = env.get("XDG_RUNTIME_DIR").map(PathBuf::from) {
        candidates.push(runtime_dir.join("gdm").join("Xauthority"));
        candidates.push(runtime_dir.join("Xauthority"));
    }
    candidates.push(PathBuf::from("/var/run/lightdm/root/:0"));
    candidates
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    for path in candidates {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => return Some(path.clone()),
            Ok(_) => {
                debug!(path = %path.display(), "auth cookie candidate is not a regular file")
            }
            Err(e) => debug!(path = %path.display(), error = %e, "auth cookie probe missed"),
        }
    }
    None
}

/// Ensure `XAUTHORITY` is present if any known cookie file exists on disk.
/// Leaves the mapping alone when the session already supplied one.
pub fn patch_xauthority(env: &mut DisplayEnv) {
    if env.contains_key("XAUTHORITY") {
        return;
    }
    match first_existing(&xauthority_candidates(env)) {
        Some(path) => {
            debug!(path = %path.display(), "adopting X authority cookie file");
            env.insert(
                "XAUTHORITY".to_string(),
                path.to_string_lossy().into_owned(),
            );
        }
        None => {
            warn!("no X authority cookie file found; the display server may refuse the browser")
        }
    }
}

/// Capture a live snapshot of the process table.
pub fn snapshot_processes() -> Vec<ProcessEntry> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    system
        .processes()
        .values()
        .map(|process| {
            let environ = process
                .environ()
                .iter()
                .filter_map(|kv| {
                    let kv = kv.to_string_lossy();
                    let (key, value) = kv.split_once('=')?;
                    if key.is_empty() {
                        return None;
                    }
                    Some((key.to_string(), value.to_string()))
                })
                .collect();
            ProcessEntry {
                name: process.name().to_string_lossy().into_owned(),
                environ,
            }
        })
        .collect()
}

/// Resolve an environment mapping for launching a graphical child process.
/// Best effort: always succeeds, degrading to the caller's environment plus
/// `DISPLAY=:0` when no session can be found.
pub fn resolve_display_env() -> DisplayEnv {
    let base: DisplayEnv = std::env::vars().collect();
    let table = snapshot_processes();
    let mut env = resolve_with(&table, &base);
    patch_xauthority(&mut env);
    info!(
        display = %env.get("DISPLAY").map(String::as_str).unwrap_or(DEFAULT_DISPLAY),
        xauthority = env.get("XAUTHORITY").map(String::as_str).unwrap_or("<none>"),
        "resolved display environment"
    );
    env
}

/// Copy the display-session subset of a resolved mapping onto this process
/// so a spawned browser inherits it.
pub fn apply_to_session_env(env: &DisplayEnv) {
    for key in SESSION_ENV_KEYS {
        if let Some(value) = env.get(*key) {
            std::env::set_var(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, pairs: &[(&str, &str)]) -> ProcessEntry {
        ProcessEntry::new(
            name,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn base_env(pairs: &[(&str, &str)]) -> DisplayEnv {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_table_falls_back_to_base_plus_default_display() {
        let base = base_env(&[("HOME", "/home/alice"), ("PATH", "/usr/bin")]);
        let resolved = resolve_with(&[], &base);

        let mut expected = base.clone();
        expected.insert("DISPLAY".to_string(), DEFAULT_DISPLAY.to_string());
        assert_eq!(resolved, expected);
    }

    #[test]
    fn unrelated_processes_do_not_contribute() {
        let base = base_env(&[]);
        let table = vec![
            entry("systemd", &[("DISPLAY", ":9")]),
            entry("sshd", &[("DISPLAY", ":9")]),
        ];
        let resolved = resolve_with(&table, &base);
        assert_eq!(resolved.get("DISPLAY").unwrap(), DEFAULT_DISPLAY);
    }

    #[test]
    fn display_always_present() {
        let tables = vec![
            vec![],
            vec![entry("gnome-shell", &[])],
            vec![entry("Xorg", &[("XAUTHORITY", "/tmp/xauth")])],
            vec![entry("bash", &[]), entry("sway", &[("WAYLAND_DISPLAY", "wayland-1")])],
        ];
        for table in tables {
            let resolved = resolve_with(&table, &base_env(&[]));
            assert!(resolved.contains_key("DISPLAY"), "table: {table:?}");
        }
    }

    #[test]
    fn session_environment_merges_over_base() {
        let base = base_env(&[("DISPLAY", ":7"), ("LANG", "C")]);
        let table = vec![entry(
            "gnome-shell",
            &[("DISPLAY", ":0"), ("XAUTHORITY", "/run/user/1000/gdm/Xauthority")],
        )];
        let resolved = resolve_with(&table, &base);

        assert_eq!(resolved.get("DISPLAY").unwrap(), ":0");
        assert_eq!(
            resolved.get("XAUTHORITY").unwrap(),
            "/run/user/1000/gdm/Xauthority"
        );
        // Untouched base entries survive the merge.
        assert_eq!(resolved.get("LANG").unwrap(), "C");
    }

    #[test]
    fn window_manager_beats_display_server_regardless_of_table_order() {
        let table = vec![
            entry("Xorg", &[("DISPLAY", ":1")]),
            entry("gnome-shell", &[("DISPLAY", ":0")]),
        ];
        let resolved = resolve_with(&table, &base_env(&[]));
        assert_eq!(resolved.get("DISPLAY").unwrap(), ":0");
    }

    #[test]
    fn session_manager_beats_display_server() {
        let table = vec![
            entry("Xwayland", &[("DISPLAY", ":2")]),
            entry("xfce4-session", &[("DISPLAY", ":0.0")]),
        ];
        let resolved = resolve_with(&table, &base_env(&[]));
        assert_eq!(resolved.get("DISPLAY").unwrap(), ":0.0");
    }

    #[test]
    fn caller_display_survives_when_no_candidate_found() {
        let base = base_env(&[("DISPLAY", ":5")]);
        let resolved = resolve_with(&[], &base);
        assert_eq!(resolved.get("DISPLAY").unwrap(), ":5");
    }

    #[test]
    fn candidate_without_display_still_yields_default() {
        let table = vec![entry("mutter", &[("XDG_RUNTIME_DIR", "/run/user/1000")])];
        let resolved = resolve_with(&table, &base_env(&[]));
        assert_eq!(resolved.get("DISPLAY").unwrap(), DEFAULT_DISPLAY);
        assert_eq!(
            resolved.get("XDG_RUNTIME_DIR").unwrap(),
            "/run/user/1000"
        );
    }

    #[test]
    fn empty_environ_keys_are_ignored() {
        let mut environ = HashMap::new();
        environ.insert(String::new(), "junk".to_string());
        environ.insert("DISPLAY".to_string(), ":0".to_string());
        let table = vec![ProcessEntry::new("gnome-shell", environ)];

        let resolved = resolve_with(&table, &base_env(&[]));
        assert!(!resolved.contains_key(""));
        assert_eq!(resolved.get("DISPLAY").unwrap(), ":0");
    }

    #[test]
    fn truncated_comm_name_matches_candidate() {
        // "gnome-session-binary" shows up as a 15-byte comm name.
        let table = vec![entry("gnome-session-b", &[("DISPLAY", ":0")])];
        let resolved = resolve_with(&table, &base_env(&[]));
        assert_eq!(resolved.get("DISPLAY").unwrap(), ":0");
    }

    #[test]
    fn short_name_requires_exact_match() {
        // "i3status" must not be mistaken for the "i3" window manager.
        let table = vec![entry("i3status", &[("DISPLAY", ":3")])];
        let resolved = resolve_with(&table, &base_env(&[]));
        assert_eq!(resolved.get("DISPLAY").unwrap(), DEFAULT_DISPLAY);
    }

    #[test]
    fn xauthority_adopted_from_home_probe() {
        let dir = tempfile::tempdir().unwrap();
        let cookie = dir.path().join(".Xauthority");
        std::fs::write(&cookie, b"cookie").unwrap();

        let mut env = base_env(&[("HOME", dir.path().to_str().unwrap())]);
        patch_xauthority(&mut env);

        assert_eq!(
            env.get("XAUTHORITY").unwrap(),
            cookie.to_str().unwrap()
        );
    }

    #[test]
    fn existing_xauthority_is_not_probed_over() {
        let mut env = base_env(&[("XAUTHORITY", "/tmp/custom-xauth")]);
        patch_xauthority(&mut env);
        assert_eq!(env.get("XAUTHORITY").unwrap(), "/tmp/custom-xauth");
    }

    #[test]
    fn runtime_dir_candidates_come_in_fixed_order() {
        let env = base_env(&[("HOME", "/home/bob"), ("XDG_RUNTIME_DIR", "/run/user/1000")]);
        let candidates = xauthority_candidates(&env);
        assert_eq!(candidates[0], PathBuf::from("/home/bob/.Xauthority"));
        assert_eq!(
            candidates[1],
            PathBuf::from("/run/user/1000/gdm/Xauthority")
        );
        assert_eq!(candidates[2], PathBuf::from("/run/user/1000/Xauthority"));
        assert_eq!(candidates[3], PathBuf::from("/var/run/lightdm/root/:0"));
    }

    #[test]
    fn first_existing_skips_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("Xauthority");
        std::fs::write(&present, b"cookie").unwrap();

        let candidates = vec![dir.path().join("missing"), present.clone()];
        assert_eq!(first_existing(&candidates), Some(present));
        assert_eq!(first_existing(&[dir.path().join("also-missing")]), None);
    }
}
