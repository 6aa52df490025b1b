//! JSON documents exchanged with the CLAI server.

use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// What the shell tells the server, once before and once after a command runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StateCommand {
    pub command_id:  String,
    pub user_name:   String,
    pub command:     String,
    pub root:        bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr:      Option<String>,
}
impl StateCommand {
    pub fn pre(command_id: u64, user_name: &str, command: &str) -> Self {
        Self {
            command_id: command_id.to_string(),
            user_name:  user_name.to_string(),
            command:    command.to_string(),
            root:       user_name == "root",
            ..Self::default()
        }
    }
    pub fn post(command_id: u64, user_name: &str, command: &str, outcome: &CommandOutcome) -> Self {
        Self {
            result_code: Some(outcome.result_code.to_string()),
            stderr:      Some(outcome.stderr.clone()),
            ..Self::pre(command_id, user_name, command)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutcome { pub result_code: i32, pub stderr: String }

/// The server writes `null` for "no suggestion" and unset scores.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Action {
    #[serde(deserialize_with = "null_as_default")]
    pub origin_command:    String,
    #[serde(deserialize_with = "null_as_default")]
    pub suggested_command: String,
    pub description:       Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub confidence:        f64,
    #[serde(deserialize_with = "null_as_default")]
    pub execute:           bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Several skills may answer the same state; the server then sends a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ActionReply { One(Action), Many(Vec<Action>) }

impl ActionReply {
    pub fn best(self) -> Action {
        match self {
            ActionReply::One(a) => a,
            ActionReply::Many(all) => all
                .into_iter()
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
                .unwrap_or_default(),
        }
    }
}

/// A suggestion and the server's verdict after it ran, tagged with the id the
/// presenter gave the exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponsePair {
    pub command_id: u64,
    pub response:   Action,
    pub post:       Action,
}

/// One request per connection: write the state, read back a single JSON value.
pub fn exchange(address: &str, state: &StateCommand, timeout: Duration) -> Result<Action> {
    let addr = address.to_socket_addrs()
        .with_context(|| format!("resolve {address}"))?
        .next()
        .with_context(|| format!("no address for {address}"))?;
    let mut stream = TcpStream::connect_timeout(&addr, timeout)
        .with_context(|| format!("connect to CLAI server at {address}"))?;
    stream.set_read_timeout(Some(timeout)).context("set read timeout")?;
    stream.set_write_timeout(Some(timeout)).context("set write timeout")?;

    let mut payload = serde_json::to_vec(state).context("encode state")?;
    payload.push(b'\n');
    stream.write_all(&payload).context("send state")?;
    stream.flush().context("flush state")?;

    let mut values = serde_json::Deserializer::from_reader(BufReader::new(stream)).into_iter::<ActionReply>();
    let reply = values.next()
        .context("server closed the connection without replying")?
        .context("decode server reply")?;
    Ok(reply.best())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_reply_single_object_with_missing_fields() {
        let reply: ActionReply = serde_json::from_str(r#"{"suggested_command": "ls -la", "confidence": 0.7}"#).unwrap();
        let a = reply.best();
        assert_eq!(a.suggested_command, "ls -la");
        assert_eq!(a.origin_command, "");
        assert_eq!(a.description, None);
        assert!(!a.execute);
    }

    #[test]
    fn test_reply_with_null_fields() {
        let reply: ActionReply = serde_json::from_str(
            r#"{"origin_command":"ls","suggested_command":null,"description":null,"confidence":null,"execute":null}"#,
        ).unwrap();
        let a = reply.best();
        assert_eq!(a.origin_command, "ls");
        assert_eq!(a.suggested_command, "");
        assert_eq!(a.description, None);
        assert_eq!(a.confidence, 0.0);
        assert!(!a.execute);

        let many: ActionReply = serde_json::from_str(
            r#"[{"suggested_command":null,"confidence":0.2},{"suggested_command":"ls -a","confidence":0.6}]"#,
        ).unwrap();
        assert_eq!(many.best().suggested_command, "ls -a");
    }

    #[test]
    fn test_reply_list_picks_most_confident() {
        let reply: ActionReply = serde_json::from_str(
            r#"[{"suggested_command": "a", "confidence": 0.1},
                {"suggested_command": "b", "confidence": 0.9},
                {"suggested_command": "c", "confidence": 0.4}]"#,
        ).unwrap();
        assert_eq!(reply.best().suggested_command, "b");
        let empty: ActionReply = serde_json::from_str("[]").unwrap();
        assert_eq!(empty.best(), Action::default());
    }

    #[test]
    fn test_post_state_carries_outcome() {
        let outcome = CommandOutcome { result_code: 2, stderr: "no such file".into() };
        let s = StateCommand::post(4, "ana", "cat nope", &outcome);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["command_id"], "4");
        assert_eq!(json["result_code"], "2");
        assert_eq!(json["stderr"], "no such file");
        assert_eq!(json["root"], false);

        let pre = serde_json::to_value(StateCommand::pre(4, "root", "ls")).unwrap();
        assert!(pre.get("result_code").is_none());
        assert_eq!(pre["root"], true);
    }

    #[test]
    fn test_exchange_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
            let state: StateCommand = serde_json::from_str(&line).unwrap();
            let reply = Action {
                origin_command: state.command.clone(),
                suggested_command: format!("{} --help", state.command),
                description: Some("try help".into()),
                confidence: 0.5,
                execute: false,
            };
            (&stream).write_all(serde_json::to_string(&reply).unwrap().as_bytes()).unwrap();
            state
        });

        let sent = StateCommand::pre(0, "ana", "tar");
        let action = exchange(&address, &sent, Duration::from_secs(5)).unwrap();
        assert_eq!(action.suggested_command, "tar --help");
        assert_eq!(action.origin_command, "tar");
        assert_eq!(server.join().unwrap(), sent);
    }
}
