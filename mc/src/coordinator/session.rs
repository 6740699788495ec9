//! One participant's control session
//!
//! Reads command lines, applies them to the [`Group`] and writes exactly one
//! reply line per command. The session is bound to a participant id only by a
//! successful `register`.

use std::sync::Arc;

use eyre::Result;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, info};

use super::group::Group;
use crate::protocol::{Command, ParseError, ParticipantId, ProtocolError, Reply, read_line_bytes, write_line};

pub struct CommandSession<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    group: Arc<Group>,
    identity: Option<ParticipantId>,
    max_line_bytes: usize,
    peer: String,
}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> CommandSession<S> {
    pub fn new(stream: S, group: Arc<Group>, max_line_bytes: usize, peer: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            group,
            identity: None,
            max_line_bytes,
            peer: peer.into(),
        }
    }

    /// Participant this session is bound to, if any
    pub fn identity(&self) -> Option<ParticipantId> {
        self.identity
    }

    /// Serve commands until the peer hangs up or shutdown is signalled
    ///
    /// A command already being handled is finished and answered before the
    /// shutdown signal is observed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        debug!(peer = %self.peer, "CommandSession::run: called");
        loop {
            let line = tokio::select! {
                line = read_line_bytes(&mut self.reader, self.max_line_bytes) => line?,
                Ok(_) = shutdown.wait_for(|stop| *stop) => {
                    debug!(peer = %self.peer, "CommandSession::run: shutdown signalled");
                    break;
                }
            };

            let Some(line) = line else {
                debug!(peer = %self.peer, "CommandSession::run: peer closed connection");
                break;
            };

            let reply = match String::from_utf8(line) {
                Ok(line) => self.handle_line(&line).await,
                Err(_) => {
                    debug!(peer = %self.peer, "CommandSession::run: line is not UTF-8");
                    Reply::InvalidArguments("invalid UTF-8".to_string())
                }
            };
            write_line(&mut self.writer, &reply.to_string()).await?;
        }

        if let Some(id) = self.identity {
            info!(participant_id = %id, peer = %self.peer, "Control session ended");
        }
        Ok(())
    }

    /// Parse and apply one command line
    pub async fn handle_line(&mut self, line: &str) -> Reply {
        match Command::parse(line) {
            Ok(command) => self.handle_command(command).await,
            Err(ParseError::Empty | ParseError::UnknownCommand(_)) => {
                debug!(peer = %self.peer, %line, "CommandSession::handle_line: unrecognized");
                Reply::InvalidInput
            }
            Err(e) => Reply::InvalidArguments(e.to_string()),
        }
    }

    async fn handle_command(&mut self, command: Command) -> Reply {
        debug!(peer = %self.peer, keyword = command.keyword(), identity = ?self.identity, "CommandSession::handle_command: called");
        self.apply(command).await.unwrap_or_else(Reply::from)
    }

    async fn apply(&mut self, command: Command) -> Result<Reply, ProtocolError> {
        match command {
            Command::Register { id, endpoint } => {
                if let Some(bound) = self.identity.filter(|bound| self.group.is_member(*bound)) {
                    return Err(ProtocolError::AlreadyRegistered(bound));
                }
                self.group.register(id, endpoint).await?;
                self.identity = Some(id);
                Ok(Reply::Registered)
            }
            Command::Deregister => {
                self.group.deregister(self.bound()?).await?;
                self.identity = None;
                Ok(Reply::Deregistered)
            }
            Command::Disconnect => {
                self.group.disconnect(self.bound()?).await?;
                Ok(Reply::Disconnected)
            }
            Command::Reconnect { endpoint } => {
                self.group.reconnect(self.bound()?, endpoint).await?;
                Ok(Reply::Reconnected)
            }
            Command::Msend { payload } => {
                self.group.msend(self.bound()?, &payload).await?;
                Ok(Reply::MsendAccepted)
            }
        }
    }

    fn bound(&self) -> Result<ParticipantId, ProtocolError> {
        self.identity.ok_or(ProtocolError::NotAMember)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::config::CoordinatorConfig;
    use crate::coordinator::metrics::Metrics;
    use crate::protocol::{Endpoint, read_frame, read_line, reply};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::net::{TcpListener, TcpStream};

    fn group() -> Arc<Group> {
        Arc::new(Group::new(&CoordinatorConfig::default(), Arc::new(Metrics::new())))
    }

    fn session(group: Arc<Group>) -> CommandSession<DuplexStream> {
        let (server, _client) = tokio::io::duplex(1024);
        CommandSession::new(server, group, 1024, "test")
    }

    async fn delivery_listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    async fn register(session: &mut CommandSession<DuplexStream>, id: u32) -> TcpStream {
        let (listener, endpoint) = delivery_listener().await;
        let line = format!("register {},{},{}", id, endpoint.host, endpoint.port);
        let (reply, accepted) = tokio::join!(session.handle_line(&line), listener.accept());
        assert_eq!(reply, Reply::Registered);
        accepted.unwrap().0
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let mut session = session(group());
        assert_eq!(session.handle_line("shout hi").await, Reply::InvalidInput);
        assert_eq!(session.handle_line("").await, Reply::InvalidInput);
        assert_eq!(
            session.handle_line("register x,1.2.3.4,5").await.to_string(),
            "Invalid input: invalid participant id 'x'"
        );
    }

    #[tokio::test]
    async fn test_commands_without_registration() {
        let mut session = session(group());
        for line in ["deregister", "disconnect", "reconnect 127.0.0.1,9000", "msend hi"] {
            assert_eq!(
                session.handle_line(line).await,
                Reply::Failed(ProtocolError::NotAMember),
                "{}",
                line
            );
        }
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn test_register_binds_identity() {
        let group = group();
        let mut session = session(group.clone());
        let mut delivery = register(&mut session, 7).await;
        assert_eq!(session.identity(), Some(ParticipantId(7)));

        assert_eq!(session.handle_line("msend hello").await, Reply::MsendAccepted);
        assert_eq!(read_frame(&mut delivery).await.unwrap().as_deref(), Some("hello"));

        let (_listener, endpoint) = delivery_listener().await;
        let again = format!("register 8,{},{}", endpoint.host, endpoint.port);
        assert_eq!(
            session.handle_line(&again).await,
            Reply::Failed(ProtocolError::AlreadyRegistered(ParticipantId(7)))
        );
    }

    #[tokio::test]
    async fn test_failed_register_leaves_session_unbound() {
        let group = group();
        let mut first = session(group.clone());
        let _delivery = register(&mut first, 1).await;

        let mut second = session(group);
        let (_listener, endpoint) = delivery_listener().await;
        let line = format!("register 1,{},{}", endpoint.host, endpoint.port);
        assert_eq!(
            second.handle_line(&line).await,
            Reply::Failed(ProtocolError::DuplicateParticipant(ParticipantId(1)))
        );
        assert!(second.identity().is_none());
    }

    #[tokio::test]
    async fn test_deregister_clears_identity() {
        let group = group();
        let mut session = session(group.clone());
        let _delivery = register(&mut session, 3).await;

        assert_eq!(session.handle_line("deregister").await, Reply::Deregistered);
        assert!(session.identity().is_none());
        assert_eq!(
            session.handle_line("deregister").await,
            Reply::Failed(ProtocolError::NotAMember)
        );

        // Free to join again
        let _delivery = register(&mut session, 3).await;
    }

    #[tokio::test]
    async fn test_disconnect_keeps_identity_for_reconnect() {
        let group = group();
        let mut session = session(group.clone());
        let _first = register(&mut session, 2).await;

        assert_eq!(session.handle_line("disconnect").await, Reply::Disconnected);
        assert_eq!(session.identity(), Some(ParticipantId(2)));
        assert_eq!(session.handle_line("msend later").await, Reply::MsendAccepted);

        let (listener, endpoint) = delivery_listener().await;
        let line = format!("reconnect {},{}", endpoint.host, endpoint.port);
        let (reply, accepted) = tokio::join!(session.handle_line(&line), listener.accept());
        assert_eq!(reply, Reply::Reconnected);

        let mut second = accepted.unwrap().0;
        assert_eq!(read_frame(&mut second).await.unwrap().as_deref(), Some("later"));
    }

    #[tokio::test]
    async fn test_run_answers_each_line() {
        let (server, client) = tokio::io::duplex(1024);
        let session = CommandSession::new(server, group(), 1024, "run");
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(session.run(rx));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut client_read = BufReader::new(client_read);
        client_write.write_all(b"bogus\nmsend hi\n").await.unwrap();

        assert_eq!(
            read_line(&mut client_read, 1024).await.unwrap().as_deref(),
            Some(reply::INVALID_INPUT)
        );
        assert_eq!(
            read_line(&mut client_read, 1024).await.unwrap().as_deref(),
            Some("Participant is not registered.Please check")
        );

        client_write.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_answers_invalid_utf8_and_continues() {
        let (server, client) = tokio::io::duplex(1024);
        let session = CommandSession::new(server, group(), 1024, "bytes");
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(session.run(rx));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut client_read = BufReader::new(client_read);
        client_write.write_all(b"msend \xff\xfe\nbogus\n").await.unwrap();

        assert_eq!(
            read_line(&mut client_read, 1024).await.unwrap().as_deref(),
            Some("Invalid input: invalid UTF-8")
        );
        assert_eq!(
            read_line(&mut client_read, 1024).await.unwrap().as_deref(),
            Some(reply::INVALID_INPUT)
        );

        client_write.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (server, _client) = tokio::io::duplex(1024);
        let session = CommandSession::new(server, group(), 1024, "idle");
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(session.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_line_ends_session() {
        let (server, mut client) = tokio::io::duplex(4096);
        let session = CommandSession::new(server, group(), 16, "big");
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(session.run(rx));

        client.write_all(format!("msend {}\n", "x".repeat(64)).as_bytes()).await.unwrap();
        assert!(task.await.unwrap().is_err());
    }
}
