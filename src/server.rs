use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::Config;
use crate::presenter::{PendingResponse, Presenter, PresenterEvent};
use crate::protocol::{exchange, CommandOutcome, ResponsePair, StateCommand};

const SKILLS_COMMAND: &str = "clai skills";
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Shared {
    server_running:       bool,
    command_id:           u64,
    current_active_skill: Option<String>,
    child:                Option<Child>,
    generation:           u64,
}

/// Talks to a CLAI server on `config.address()`, spawning it on demand.
pub struct ClaiPresenter {
    config:   Arc<Config>,
    shared:   Arc<Mutex<Shared>>,
    event_tx: Sender<PresenterEvent>,
    event_rx: Receiver<PresenterEvent>,
}

impl Drop for ClaiPresenter {
    fn drop(&mut self) {
        let mut s = self.shared.lock();
        s.generation += 1;
        if let Some(mut child) = s.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl ClaiPresenter {
    pub fn new(config: Config) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self { config: Arc::new(config), shared: Arc::new(Mutex::new(Shared::default())), event_tx, event_rx }
    }

    fn listening(address: &str) -> bool {
        address.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .is_some_and(|addr| TcpStream::connect_timeout(&addr, Duration::from_millis(300)).is_ok())
    }

    fn spawn_server(&self) -> Result<Child> {
        Command::new(&self.config.server_command)
            .args(&self.config.server_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start `{}`", self.config.server_command))
    }

    fn fetch_skills(config: &Config, shared: &Mutex<Shared>, tx: &Sender<PresenterEvent>) {
        let id = shared.lock().command_id;
        let state = StateCommand::pre(id, &config.user_name, SKILLS_COMMAND);
        match exchange(&config.address(), &state, config.request_timeout()) {
            Ok(action) => {
                let listing = action.description.unwrap_or_default();
                let skills: Vec<String> = listing.lines().map(str::to_string).collect();
                log::debug!("skill listing has {} lines", skills.len());
                let _ = tx.send(PresenterEvent::SkillsReady(skills));
            }
            Err(e) => {
                log::warn!("skill listing failed: {e:#}");
                let _ = tx.send(PresenterEvent::Error(format!("Could not list skills: {e:#}")));
            }
        }
    }

    /// Waits for the port to open, then for the child to exit (or, when
    /// attached to a server it did not spawn, for the port to close). A newer
    /// `run_server`/`stop_server` bumps `generation`, which retires this watcher.
    fn watch_server(config: Arc<Config>, shared: Arc<Mutex<Shared>>, tx: Sender<PresenterEvent>, generation: u64) {
        let address = config.address();
        let deadline = Instant::now() + config.startup_timeout();
        loop {
            if shared.lock().generation != generation { return; }
            if Self::listening(&address) { break; }
            let exited = match shared.lock().child.as_mut() {
                Some(child) => !matches!(child.try_wait(), Ok(None)),
                None => true,
            };
            if exited || Instant::now() >= deadline {
                let mut s = shared.lock();
                if s.generation != generation { return; }
                if let Some(mut child) = s.child.take() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                log::warn!("CLAI server did not start listening on {address}");
                let _ = tx.send(PresenterEvent::Error(format!("Server did not come up on {address}")));
                let _ = tx.send(PresenterEvent::ServerStopped);
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }

        {
            let mut s = shared.lock();
            if s.generation != generation { return; }
            s.server_running = true;
        }
        log::info!("CLAI server listening on {address}");
        let _ = tx.send(PresenterEvent::ServerRunning);
        Self::fetch_skills(&config, &shared, &tx);

        let attached = shared.lock().child.is_none();
        loop {
            thread::sleep(POLL_INTERVAL);
            let gone = attached && !Self::listening(&address);
            let mut s = shared.lock();
            if s.generation != generation { return; }
            let exited = match s.child.as_mut() {
                Some(child) => !matches!(child.try_wait(), Ok(None)),
                None => gone,
            };
            if exited {
                s.child = None;
                s.server_running = false;
                log::info!("CLAI server on {address} went away");
                // sent under the lock so a concurrent stop_server cannot swallow it
                let _ = tx.send(PresenterEvent::ServerStopped);
                return;
            }
        }
    }

    fn execute_locally(shell: &str, command: &str) -> Result<CommandOutcome> {
        let out = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("run `{command}` with {shell}"))?;
        Ok(CommandOutcome {
            result_code: out.status.code().unwrap_or(-1),
            stderr:      String::from_utf8_lossy(&out.stderr).trim_end().to_string(),
        })
    }

    fn round_trip(config: &Config, command_id: u64, command: &str) -> Result<ResponsePair> {
        let address = config.address();
        let timeout = config.request_timeout();
        let response = exchange(&address, &StateCommand::pre(command_id, &config.user_name, command), timeout)?;

        let outcome = if config.execute_commands {
            let to_run = if response.suggested_command.is_empty() { command } else { response.suggested_command.as_str() };
            Self::execute_locally(&config.shell, to_run)?
        } else {
            CommandOutcome::default()
        };

        let post_state = StateCommand::post(command_id, &config.user_name, command, &outcome);
        let post = exchange(&address, &post_state, timeout)?;
        Ok(ResponsePair { command_id, response, post })
    }
}

impl Presenter for ClaiPresenter {
    fn run_server(&mut self) {
        let generation = {
            let mut s = self.shared.lock();
            if s.server_running || s.child.is_some() { return; }
            s.generation += 1;
            s.generation
        };

        if !Self::listening(&self.config.address()) {
            match self.spawn_server() {
                Ok(child) => {
                    log::info!("spawned CLAI server (pid {})", child.id());
                    self.shared.lock().child = Some(child);
                }
                Err(e) => {
                    log::warn!("{e:#}");
                    let _ = self.event_tx.send(PresenterEvent::Error(format!("{e:#}")));
                    return;
                }
            }
        } else {
            log::info!("attaching to CLAI server already on {}", self.config.address());
        }

        let (config, shared, tx) = (Arc::clone(&self.config), Arc::clone(&self.shared), self.event_tx.clone());
        thread::spawn(move || Self::watch_server(config, shared, tx, generation));
    }

    fn stop_server(&mut self) {
        let was_up = {
            let mut s = self.shared.lock();
            s.generation += 1;
            let had_child = match s.child.take() {
                Some(mut child) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::info!("stopped CLAI server");
                    true
                }
                None => false,
            };
            std::mem::replace(&mut s.server_running, false) || had_child
        };
        if was_up {
            let _ = self.event_tx.send(PresenterEvent::ServerStopped);
        }
    }

    fn select_skill(&mut self, name: &str, installed: bool) {
        let verb = if installed { "activate" } else { "install" };
        let command = format!("clai {verb} {name}");
        self.shared.lock().current_active_skill = Some(name.to_string());
        log::info!("{verb} skill {name}");

        let config = Arc::clone(&self.config);
        let shared = Arc::clone(&self.shared);
        let tx     = self.event_tx.clone();
        thread::spawn(move || {
            let id = shared.lock().command_id;
            let state = StateCommand::pre(id, &config.user_name, &command);
            if let Err(e) = exchange(&config.address(), &state, config.request_timeout()) {
                log::warn!("`{command}` failed: {e:#}");
                let _ = tx.send(PresenterEvent::Error(format!("`{command}` failed: {e:#}")));
                return;
            }
            Self::fetch_skills(&config, &shared, &tx);
        });
    }

    fn send_message(&mut self, command: &str) -> PendingResponse {
        let command_id = {
            let mut s = self.shared.lock();
            let id = s.command_id;
            s.command_id += 1;
            id
        };
        log::debug!("dispatching #{command_id}: {command}");

        let (tx, rx) = bounded(1);
        let config  = Arc::clone(&self.config);
        let owned   = command.to_string();
        thread::spawn(move || {
            let result = Self::round_trip(&config, command_id, &owned).map_err(|e| {
                log::warn!("command #{command_id} failed: {e:#}");
                format!("{e:#}")
            });
            let _ = tx.send(result);
        });
        PendingResponse::new(command, rx)
    }

    fn command_id(&self) -> u64 { self.shared.lock().command_id }
    fn current_active_skill(&self) -> Option<String> { self.shared.lock().current_active_skill.clone() }
    fn set_current_active_skill(&mut self, name: String) { self.shared.lock().current_active_skill = Some(name); }
    fn server_running(&self) -> bool { self.shared.lock().server_running }
    fn server_starting(&self) -> bool {
        let s = self.shared.lock();
        !s.server_running && s.child.is_some()
    }

    fn try_next_event(&mut self) -> Option<PresenterEvent> { self.event_rx.try_recv().ok() }
}
