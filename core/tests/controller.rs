use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use wgctl_core::ControlError;
use wgctl_core::config::Settings;
use wgctl_core::executor::{ElevationMode, Invocation, RawOutput};
use wgctl_core::platform::{CommandRunner, SecretPrompt};
use wgctl_core::poller::StatusPoller;
use wgctl_core::{StatusReport, TunnelController, TunnelStatus};

/// Stands in for sudo + wg + wg-quick.
#[derive(Default)]
struct FakeWireGuard {
    up: Mutex<Vec<String>>,
    calls: Mutex<Vec<Vec<String>>>,
    refuse_up: AtomicBool,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
}

impl FakeWireGuard {
    fn with_active(names: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        *fake.up.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
        Arc::new(fake)
    }

    fn set_active(&self, names: &[&str]) {
        *self.up.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|argv| argv.join(" "))
            .collect()
    }
}

impl CommandRunner for FakeWireGuard {
    fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&[u8]>,
        _timeout: Option<Duration>,
    ) -> io::Result<RawOutput> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(2));

        assert_eq!(invocation.program, Path::new("sudo"));
        assert_eq!(stdin, Some(&b"pw\n"[..]));
        let argv: Vec<String> = invocation.args[4..].to_vec();
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.calls.lock().unwrap().push(argv.clone());

        let mut up = self.up.lock().unwrap();
        let reply = match args.as_slice() {
            ["wg", "show", "interfaces"] => {
                let mut listing = up.join("\n");
                if !listing.is_empty() {
                    listing.push('\n');
                }
                RawOutput::exited(0, listing, "")
            }
            ["wg", "show", name] if up.iter().any(|u| u == name) => {
                RawOutput::exited(0, format!("interface: {name}\n  listening port: 51820\n"), "")
            }
            ["wg", "show", name] => RawOutput::exited(
                1,
                "",
                format!("Unable to access interface: No such device\n(name {name})\n"),
            ),
            ["wg-quick", "up", _] if self.refuse_up.load(Ordering::SeqCst) => {
                RawOutput::exited(1, "", "RTNETLINK answers: Operation not permitted\n")
            }
            ["wg-quick", "up", name] if up.iter().any(|u| u == name) => {
                RawOutput::exited(1, "", format!("wg-quick: `{name}' already exists\n"))
            }
            ["wg-quick", "up", name] => {
                up.push(name.to_string());
                RawOutput::exited(0, "", format!("[#] ip link add {name} type wireguard\n"))
            }
            ["wg-quick", "down", name] if up.iter().any(|u| u == name) => {
                up.retain(|u| u != name);
                RawOutput::exited(0, "", format!("[#] ip link delete dev {name}\n"))
            }
            ["wg-quick", "down", name] => RawOutput::exited(
                1,
                "",
                format!("wg-quick: `{name}' is not a WireGuard interface\n"),
            ),
            other => panic!("unexpected command {other:?}"),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(reply)
    }
}

struct CountingPrompt {
    calls: AtomicUsize,
    available: bool,
}

impl CountingPrompt {
    fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            available,
        })
    }
}

impl SecretPrompt for CountingPrompt {
    fn prompt(&self, _message: &str) -> io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok("pw".to_string())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "not a terminal"))
        }
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    tool: Arc<FakeWireGuard>,
    prompt: Arc<CountingPrompt>,
    controller: Arc<TunnelController>,
}

fn fixture(configs: &[&str], active: &[&str], prompt_available: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    for name in configs {
        fs::write(dir.path().join(format!("{name}.conf")), "[Interface]\n").unwrap();
    }
    fs::write(dir.path().join("README"), "").unwrap();

    let settings = Settings {
        config_dir: dir.path().to_path_buf(),
        elevation: ElevationMode::Sudo,
        ..Settings::default()
    };
    let tool = FakeWireGuard::with_active(active);
    let prompt = CountingPrompt::new(prompt_available);
    let controller = Arc::new(settings.build_controller(tool.clone(), prompt.clone()));

    Fixture {
        _dir: dir,
        tool,
        prompt,
        controller,
    }
}

fn names<I: IntoIterator<Item = wgctl_core::TunnelId>>(ids: I) -> BTreeSet<String> {
    ids.into_iter().map(|id| id.to_string()).collect()
}

#[test]
fn test_home_office_scenario() {
    let f = fixture(&["home", "office"], &["home"], true);

    assert_eq!(
        names(f.controller.list_configs()),
        BTreeSet::from(["home".to_string(), "office".to_string()])
    );
    assert_eq!(f.controller.state(), TunnelStatus::Unknown);

    let report = f.controller.initialize().unwrap();
    assert_eq!(f.controller.selection().unwrap(), "home");
    assert_eq!(f.controller.get_active().unwrap().unwrap(), "home");
    assert_eq!(report.state, TunnelStatus::Up);
    assert!(report.detail.contains("interface: home"));

    let report = f.controller.stop().unwrap();
    assert_eq!(report.state, TunnelStatus::Down);
    assert!(report.diagnostics().unwrap().contains("ip link delete dev home"));

    let report = f.controller.refresh_status().unwrap();
    assert_eq!(report.state, TunnelStatus::Down);
    assert_eq!(report.active, None);
    assert!(report.detail.starts_with("Error: "));
}

#[test]
fn test_default_selection_without_active_tunnel() {
    let f = fixture(&["office", "home"], &[], true);
    let report = f.controller.initialize().unwrap();
    assert_eq!(report.selection.unwrap(), "home");
    assert_eq!(report.state, TunnelStatus::Down);

    let empty = fixture(&[], &[], true);
    let report = empty.controller.initialize().unwrap();
    assert_eq!(report.selection, None);
    assert_eq!(report.state, TunnelStatus::Down);
    assert_eq!(
        empty.controller.start().unwrap_err(),
        ControlError::NoSelection
    );
}

#[test]
fn test_select_default_only_lists_interfaces() {
    let f = fixture(&["office", "home"], &["office"], true);
    assert_eq!(f.controller.select_default().unwrap().unwrap(), "office");
    assert_eq!(f.controller.state(), TunnelStatus::Unknown);
    assert_eq!(f.tool.commands(), vec!["wg show interfaces"]);
}

#[test]
fn test_refresh_is_idempotent() {
    let f = fixture(&["home", "office"], &["office"], true);
    f.controller.initialize().unwrap();

    let first = f.controller.refresh_status().unwrap();
    let second = f.controller.refresh_status().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.state, TunnelStatus::Up);
}

#[test]
fn test_start_resolves_from_observed_state_not_exit_code() {
    let f = fixture(&["home"], &[], true);
    f.controller.select("home").unwrap();
    assert_eq!(f.controller.state(), TunnelStatus::Unknown);

    f.tool.refuse_up.store(true, Ordering::SeqCst);
    let report = f.controller.start().unwrap();
    assert_eq!(report.state, TunnelStatus::Down);
    assert!(matches!(
        report.action.clone().unwrap().into_result(),
        Err(ControlError::CommandFailed { code: Some(1), .. })
    ));
    assert!(report.diagnostics().unwrap().contains("Error code: 1"));

    // The tool reports failure but another process brought the link up anyway.
    f.tool.set_active(&["home"]);
    let report = f.controller.start().unwrap();
    assert_eq!(report.state, TunnelStatus::Up);
    assert!(!report.action.unwrap().is_success());

    let commands = f.tool.commands();
    assert_eq!(
        &commands[..3],
        &["wg-quick up home", "wg show interfaces", "wg show home"]
    );
}

#[test]
fn test_down_on_inactive_tunnel_reports_down() {
    let f = fixture(&["home"], &[], true);
    f.controller.initialize().unwrap();

    let report = f.controller.stop().unwrap();
    assert_eq!(report.state, TunnelStatus::Down);
    assert!(
        report
            .diagnostics()
            .unwrap()
            .contains("is not a WireGuard interface")
    );
    assert_eq!(f.controller.refresh_status().unwrap().state, TunnelStatus::Down);
}

#[test]
fn test_select_runs_no_commands_and_validates() {
    let f = fixture(&["home", "office"], &[], true);

    f.controller.select("office").unwrap();
    assert_eq!(f.controller.selection().unwrap(), "office");
    assert!(f.tool.commands().is_empty());
    assert_eq!(f.prompt.calls.load(Ordering::SeqCst), 0);

    assert!(matches!(
        f.controller.select("gym"),
        Err(ControlError::UnknownConfig(_))
    ));
    assert!(matches!(
        f.controller.select("home; reboot"),
        Err(ControlError::InvalidId(_))
    ));
    assert_eq!(f.controller.selection().unwrap(), "office");
}

#[test]
fn test_currently_active_interface_can_be_selected() {
    let f = fixture(&["home"], &["wg7"], true);
    assert!(f.controller.select("wg7").is_err());

    f.controller.get_active().unwrap();
    f.controller.select("wg7").unwrap();
    assert_eq!(f.controller.refresh_status().unwrap().state, TunnelStatus::Up);
}

#[test]
fn test_prompt_happens_once_across_operations() {
    let f = fixture(&["home", "office"], &[], true);
    f.controller.initialize().unwrap();
    f.controller.start().unwrap();
    f.controller.stop().unwrap();
    f.controller.select("office").unwrap();
    f.controller.refresh_status().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let controller = f.controller.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    controller.start().unwrap()
                } else {
                    controller.refresh_status().unwrap()
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(f.prompt.calls.load(Ordering::SeqCst), 1);
    assert!(!f.tool.overlapped.load(Ordering::SeqCst));
}

#[test]
fn test_missing_terminal_fails_every_privileged_operation() {
    let f = fixture(&["home"], &["home"], false);

    assert!(matches!(
        f.controller.initialize(),
        Err(ControlError::CredentialUnavailable(_))
    ));
    f.controller.select("home").unwrap();
    for result in [
        f.controller.refresh_status(),
        f.controller.start(),
        f.controller.stop(),
    ] {
        assert!(matches!(result, Err(ControlError::CredentialUnavailable(_))));
    }
    assert!(f.tool.commands().is_empty());
    assert_eq!(f.controller.state(), TunnelStatus::Unknown);
}

#[test]
fn test_poller_reports_external_changes() {
    let f = fixture(&["home"], &[], true);
    f.controller.initialize().unwrap();

    let (tx, rx) = mpsc::channel();
    let poller = StatusPoller::new(f.controller.clone(), Duration::from_millis(20));
    poller.start(Box::new(move |report: &StatusReport| {
        let _ = tx.send(report.state);
    }));
    assert!(poller.is_running());

    f.tool.set_active(&["home"]);
    let state = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(state, TunnelStatus::Up);

    poller.stop();
    assert!(!poller.is_running());
}

#[test]
fn test_list_active_reports_every_interface() {
    let f = fixture(&["home", "office"], &["office", "wg7"], true);
    assert_eq!(
        names(f.controller.list_active().unwrap()),
        BTreeSet::from(["office".to_string(), "wg7".to_string()])
    );
    // The first listed interface is the one treated as active.
    assert_eq!(f.controller.get_active().unwrap().unwrap(), "office");
}
