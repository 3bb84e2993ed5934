use std::ffi::CString;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::mqueue::{
    mq_close, mq_open, mq_receive, mq_remove_nonblock, mq_send, mq_set_nonblock, mq_unlink,
    MQ_OFlag, MqAttr, MqdT,
};
use nix::sys::stat::Mode;

/// maximum number of frames a queue buffers before senders block
pub const MAX_MESSAGES: i64 = 10;

/// size of one wire frame
pub const FRAME_SIZE: usize = 6144;

/// the `complete` flag plus padding; payload text starts after this
const HEADER_SIZE: usize = 16;

/// payload capacity of one frame, NUL terminator included
pub const CONTENT_SIZE: usize = FRAME_SIZE - HEADER_SIZE;

/// how often the bounded handshake helpers poll a non-blocking queue
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One logical frame: a completeness marker and its text payload. A reply
/// spanning several frames is terminated by the first frame with `complete`
/// set.
#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub complete: bool,
    pub content: String,
}

/// packs a payload into a wire frame. Payloads longer than the frame body are
/// truncated, keeping room for the NUL terminator.
pub fn serialize_message(content: &str, complete: bool) -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[0] = complete as u8;
    let bytes = content.as_bytes();
    let length = bytes.len().min(CONTENT_SIZE - 1);
    frame[HEADER_SIZE..HEADER_SIZE + length].copy_from_slice(&bytes[..length]);
    frame
}

/// unpacks a wire frame back into a [`Message`]
pub fn deserialize_message(frame: &[u8]) -> Message {
    let complete = !frame.is_empty() && frame[0] != 0;
    let body: &[u8] = if frame.len() > HEADER_SIZE {
        &frame[HEADER_SIZE..]
    } else {
        &[]
    };
    let end = body.iter().position(|byte| *byte == 0).unwrap_or(body.len());
    Message {
        complete,
        content: String::from_utf8_lossy(&body[..end]).into_owned(),
    }
}

/// A named POSIX message queue carrying fixed-size frames.
pub struct MessageQueue {
    mqd: MqdT,
}

impl MessageQueue {
    fn attributes() -> MqAttr {
        MqAttr::new(0, MAX_MESSAGES, FRAME_SIZE as i64, 0)
    }

    fn queue_name(name: &str) -> nix::Result<CString> {
        CString::new(name).map_err(|_| Errno::EINVAL)
    }

    /// creates the queue, failing if it already exists. Used by the daemon,
    /// so a lingering queue from another instance is a startup error.
    pub fn create(name: &str, oflag: MQ_OFlag) -> nix::Result<MessageQueue> {
        let name = Self::queue_name(name)?;
        let mqd = mq_open(
            name.as_c_str(),
            oflag | MQ_OFlag::O_CREAT | MQ_OFlag::O_EXCL,
            Mode::from_bits_truncate(0o660),
            Some(&Self::attributes()),
        )?;
        Ok(MessageQueue { mqd })
    }

    /// opens an existing queue; fails when the daemon never created it
    pub fn open(name: &str, oflag: MQ_OFlag) -> nix::Result<MessageQueue> {
        let name = Self::queue_name(name)?;
        let mqd = mq_open(
            name.as_c_str(),
            oflag,
            Mode::from_bits_truncate(0o660),
            Some(&Self::attributes()),
        )?;
        Ok(MessageQueue { mqd })
    }

    pub fn send(&self, content: &str, complete: bool) -> nix::Result<()> {
        let frame = serialize_message(content, complete);
        mq_send(&self.mqd, &frame, 0)
    }

    pub fn receive(&self) -> nix::Result<Message> {
        let mut frame = [0u8; FRAME_SIZE];
        let mut priority = 0u32;
        mq_receive(&self.mqd, &mut frame, &mut priority)?;
        Ok(deserialize_message(&frame))
    }

    /// sends with a bounded wait, polling in non-blocking mode. Used only for
    /// the client handshake; everything after the handshake blocks.
    pub fn send_with_timeout(
        &self,
        content: &str,
        complete: bool,
        timeout: Duration,
    ) -> nix::Result<()> {
        let frame = serialize_message(content, complete);
        mq_set_nonblock(&self.mqd)?;
        let deadline = Instant::now() + timeout;
        let result = loop {
            match mq_send(&self.mqd, &frame, 0) {
                Err(Errno::EAGAIN) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                other => break other,
            }
        };
        mq_remove_nonblock(&self.mqd)?;
        result
    }

    /// receives with a bounded wait, polling in non-blocking mode
    pub fn receive_with_timeout(&self, timeout: Duration) -> nix::Result<Message> {
        let mut frame = [0u8; FRAME_SIZE];
        let mut priority = 0u32;
        mq_set_nonblock(&self.mqd)?;
        let deadline = Instant::now() + timeout;
        let result = loop {
            match mq_receive(&self.mqd, &mut frame, &mut priority) {
                Err(Errno::EAGAIN) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                other => break other,
            }
        };
        mq_remove_nonblock(&self.mqd)?;
        result.map(|_| deserialize_message(&frame))
    }

    pub fn close(self) -> nix::Result<()> {
        mq_close(self.mqd)
    }

    /// removes the queue name from the system; open descriptors stay valid
    pub fn unlink(name: &str) -> nix::Result<()> {
        mq_unlink(Self::queue_name(name)?.as_c_str())
    }
}
