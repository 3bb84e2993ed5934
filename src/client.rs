use std::time::Duration;

use nix::mqueue::MQ_OFlag;

use crate::config::TAGGABLE_FS_CONFIG;
use crate::message::MessageQueue;

/// The command-line side of the request/reply channel: sends `QH_` requests
/// to the manager queue and collects multi-part replies from the query queue.
pub struct Client {
    tx: MessageQueue,
    rx: MessageQueue,
    responding: bool,
}

impl Client {
    /// opens the existing queues and pings the daemon. `None` means the
    /// queues do not exist at all, i.e. no daemon was ever started (or it
    /// shut down cleanly).
    pub fn connect() -> Option<Client> {
        let config = &*TAGGABLE_FS_CONFIG;
        let tx = MessageQueue::open(&config.queues.manager, MQ_OFlag::O_WRONLY).ok()?;
        let rx = match MessageQueue::open(&config.queues.query, MQ_OFlag::O_RDONLY) {
            Ok(rx) => rx,
            Err(e) => {
                eprintln!("ERROR: Unable to open the reply queue: {e}");
                return None;
            }
        };
        let timeout = Duration::from_millis(config.handshake.timeout_millis);
        // the handshake is the only bounded exchange; every query after it
        // blocks until the daemon replies
        let responding = tx.send_with_timeout("QH_TEST", true, timeout).is_ok()
            && rx.receive_with_timeout(timeout).is_ok();
        Some(Client { tx, rx, responding })
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    /// sends one request and accumulates frames until the complete marker
    pub fn query(&self, request: &str) -> nix::Result<Vec<String>> {
        self.tx.send(request, true)?;
        let mut results = Vec::new();
        loop {
            let message = self.rx.receive()?;
            let complete = message.complete;
            results.push(message.content);
            if complete {
                break;
            }
        }
        Ok(results)
    }

    /// fire-and-forget send with the handshake bound; used for `QH_EXIT`,
    /// which never gets a reply
    pub fn send_with_timeout(&self, request: &str) -> nix::Result<()> {
        let timeout = Duration::from_millis(TAGGABLE_FS_CONFIG.handshake.timeout_millis);
        self.tx.send_with_timeout(request, true, timeout)
    }
}
