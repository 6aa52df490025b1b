use crossbeam_channel::{Receiver, TryRecvError};

use crate::protocol::ResponsePair;

/// Notifications a presenter raises from its worker threads.
#[derive(Clone, Debug, PartialEq)]
pub enum PresenterEvent {
    SkillsReady(Vec<String>),
    ServerRunning,
    ServerStopped,
    Error(String),
}

/// Implemented by the window; events are dispatched on the UI thread.
pub trait PresenterListener {
    fn on_skills_ready(&mut self, skills: Vec<String>);
    fn on_server_running(&mut self);
    fn on_server_stopped(&mut self);
    fn on_presenter_error(&mut self, message: String);
}

pub fn dispatch(listener: &mut dyn PresenterListener, event: PresenterEvent) {
    match event {
        PresenterEvent::SkillsReady(skills) => listener.on_skills_ready(skills),
        PresenterEvent::ServerRunning       => listener.on_server_running(),
        PresenterEvent::ServerStopped       => listener.on_server_stopped(),
        PresenterEvent::Error(message)      => listener.on_presenter_error(message),
    }
}

pub trait Presenter {
    fn run_server(&mut self);
    fn stop_server(&mut self);
    fn select_skill(&mut self, name: &str, installed: bool);
    fn send_message(&mut self, command: &str) -> PendingResponse;

    /// Id the next `send_message` will be tagged with.
    fn command_id(&self) -> u64;
    fn current_active_skill(&self) -> Option<String>;
    fn set_current_active_skill(&mut self, name: String);
    fn server_running(&self) -> bool;
    /// A server was spawned but has not opened its port yet.
    fn server_starting(&self) -> bool;

    fn try_next_event(&mut self) -> Option<PresenterEvent>;
}

pub enum PendingState {
    Waiting,
    Resolved(Result<ResponsePair, String>),
}

/// An in-flight `send_message`. Dropping it abandons the result.
pub struct PendingResponse {
    pub command: String,
    rx:          Receiver<Result<ResponsePair, String>>,
}
impl PendingResponse {
    pub fn new(command: impl Into<String>, rx: Receiver<Result<ResponsePair, String>>) -> Self {
        Self { command: command.into(), rx }
    }
    pub fn poll(&self) -> PendingState {
        match self.rx.try_recv() {
            Ok(result) => PendingState::Resolved(result),
            Err(TryRecvError::Empty) => PendingState::Waiting,
            Err(TryRecvError::Disconnected) => {
                PendingState::Resolved(Err(format!("request for `{}` was dropped", self.command)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Action;
    use crossbeam_channel::bounded;

    #[derive(Default)]
    struct Recorder { calls: Vec<String> }
    impl PresenterListener for Recorder {
        fn on_skills_ready(&mut self, skills: Vec<String>) { self.calls.push(format!("skills:{}", skills.len())); }
        fn on_server_running(&mut self) { self.calls.push("running".into()); }
        fn on_server_stopped(&mut self) { self.calls.push("stopped".into()); }
        fn on_presenter_error(&mut self, message: String) { self.calls.push(format!("error:{message}")); }
    }

    #[test]
    fn test_dispatch_routes_each_event() {
        let mut r = Recorder::default();
        dispatch(&mut r, PresenterEvent::ServerRunning);
        dispatch(&mut r, PresenterEvent::SkillsReady(vec!["a".into(), "b".into()]));
        dispatch(&mut r, PresenterEvent::Error("boom".into()));
        dispatch(&mut r, PresenterEvent::ServerStopped);
        assert_eq!(r.calls, ["running", "skills:2", "error:boom", "stopped"]);
    }

    #[test]
    fn test_pending_waits_then_resolves() {
        let (tx, rx) = bounded(1);
        let pending = PendingResponse::new("ls", rx);
        assert!(matches!(pending.poll(), PendingState::Waiting));
        let pair = ResponsePair { command_id: 3, response: Action::default(), post: Action::default() };
        tx.send(Ok(pair.clone())).unwrap();
        match pending.poll() {
            PendingState::Resolved(Ok(got)) => assert_eq!(got, pair),
            _ => panic!("expected a resolved pair"),
        }
    }

    #[test]
    fn test_pending_disconnected_is_an_error() {
        let (tx, rx) = bounded::<Result<ResponsePair, String>>(1);
        drop(tx);
        let pending = PendingResponse::new("whoami", rx);
        assert!(matches!(pending.poll(), PendingState::Resolved(Err(m)) if m.contains("whoami")));
    }
}
