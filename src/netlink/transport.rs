//! Request/response engine over a netlink socket.
//!
//! A [`NetlinkRequest`] frames one message (header, genl sub-header and
//! attributes via the embedded [`MessageBuilder`]) and runs the full
//! exchange: send, then a receive loop that matches sequence and port ids,
//! reassembles multi-part dump replies, and decodes acknowledgements.
//!
//! Two socket disciplines exist. A private socket is opened for exactly one
//! exchange and closed afterwards; its sequence numbers come from a
//! process-wide atomic counter. A caller-supplied [`SocketHandle`] is reused
//! across sequential exchanges; its own counter scopes sequence numbers and
//! a mutex serializes the whole send+receive span, so interleaved replies
//! belonging to other exchanges on the same socket are skipped rather than
//! treated as protocol errors.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NLM_F_DUMP_INTR, NLM_F_REQUEST, decode_ack};
use super::socket::{NetlinkSocket, PID_KERNEL, Protocol};

/// Sequence counter for exchanges on private sockets.
static NEXT_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// A shared netlink socket with its own sequence-number scope.
///
/// Obtain one with [`SocketHandle::new`] and pass clones of the `Arc` to
/// [`NetlinkRequest::with_shared`] to run many commands over a single
/// connection. Each exchange holds the handle's lock from send through the
/// last reply, so sequence matching stays race-free.
pub struct SocketHandle {
    socket: NetlinkSocket,
    seq: AtomicU32,
    exchange: Mutex<()>,
}

impl SocketHandle {
    /// Open a shared socket for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            socket: NetlinkSocket::new(protocol)?,
            seq: AtomicU32::new(0),
            exchange: Mutex::new(()),
        }))
    }

    /// Access the underlying socket (timeout/buffer configuration).
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Close the underlying socket. In-flight exchanges finish or fail
    /// cleanly with `SocketClosed`.
    pub fn close(&self) {
        self.socket.close();
    }
}

/// A single netlink request and its exchange policy.
pub struct NetlinkRequest {
    builder: MessageBuilder,
    shared: Option<Arc<SocketHandle>>,
    res_type: u16,
}

impl NetlinkRequest {
    /// Create a request with the given message type (resolved family id)
    /// and flags. `NLM_F_REQUEST` is always set.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            builder: MessageBuilder::new(msg_type, NLM_F_REQUEST | flags),
            shared: None,
            res_type: 0,
        }
    }

    /// Run this exchange over a shared socket instead of a fresh private
    /// one.
    pub fn with_shared(mut self, handle: Arc<SocketHandle>) -> Self {
        self.shared = Some(handle);
        self
    }

    /// Only collect data messages of this type; others are skipped.
    /// Zero (the default) disables the filter.
    pub fn with_res_type(mut self, res_type: u16) -> Self {
        self.res_type = res_type;
        self
    }

    /// Execute the exchange and return the raw payloads of all data
    /// messages, in arrival order. An error at any point discards
    /// accumulated payloads; dumps are never returned truncated.
    pub fn execute(self, protocol: Protocol) -> Result<Vec<Vec<u8>>> {
        match self.shared.clone() {
            Some(handle) => {
                let _exchange = handle.exchange.lock().unwrap();
                let seq = handle.next_seq();
                self.run(handle.socket(), seq, true)
            }
            None => {
                let socket = NetlinkSocket::new(protocol)?;
                let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                let result = self.run(&socket, seq, false);
                socket.close();
                result
            }
        }
    }

    fn run(mut self, socket: &NetlinkSocket, seq: u32, shared: bool) -> Result<Vec<Vec<u8>>> {
        self.builder.set_seq(seq);
        self.builder.set_pid(socket.pid());
        let res_type = self.res_type;
        let own_pid = socket.pid();

        let msg = self.builder.finish();
        tracing::trace!(seq, len = msg.len(), "sending netlink request");
        socket.send(&msg)?;

        collect_replies(seq, own_pid, shared, res_type, || socket.receive())
    }
}

impl Deref for NetlinkRequest {
    type Target = MessageBuilder;

    fn deref(&self) -> &MessageBuilder {
        &self.builder
    }
}

impl DerefMut for NetlinkRequest {
    fn deref_mut(&mut self) -> &mut MessageBuilder {
        &mut self.builder
    }
}

/// The receive loop, factored over a datagram source so tests can script
/// kernel replies.
///
/// `recv` returns one datagram and the sender's port id per call.
fn collect_replies(
    seq: u32,
    own_pid: u32,
    shared: bool,
    res_type: u16,
    mut recv: impl FnMut() -> Result<(Vec<u8>, u32)>,
) -> Result<Vec<Vec<u8>>> {
    let mut results: Vec<Vec<u8>> = Vec::new();

    loop {
        let (data, sender) = recv()?;
        if sender != PID_KERNEL {
            return Err(Error::WrongSender { pid: sender });
        }

        for item in MessageIter::new(&data) {
            let (header, payload) = item?;

            if header.nlmsg_seq != seq {
                if shared {
                    // Belongs to a concurrent exchange on this socket.
                    tracing::trace!(
                        got = header.nlmsg_seq,
                        expected = seq,
                        "skipping interleaved reply on shared socket"
                    );
                    continue;
                }
                return Err(Error::SequenceMismatch {
                    expected: seq,
                    actual: header.nlmsg_seq,
                });
            }

            if header.nlmsg_pid != own_pid {
                continue;
            }

            if header.nlmsg_flags & NLM_F_DUMP_INTR != 0 {
                return Err(Error::DumpInterrupted);
            }

            if header.is_done() || header.is_error() {
                return match decode_ack(header, payload)? {
                    None => Ok(results),
                    Some(err) => Err(err),
                };
            }

            if res_type != 0 && header.nlmsg_type != res_type {
                continue;
            }

            results.push(payload.to_vec());

            if !header.is_multi() {
                return Ok(results);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::{
        NLM_F_MULTI, NLMSG_HDRLEN, NlMsgType,
    };
    use std::collections::VecDeque;

    const SEQ: u32 = 41;
    const OWN_PID: u32 = 7777;

    fn frame(msg_type: u16, flags: u16, seq: u32, pid: u32, payload: &[u8]) -> Vec<u8> {
        let mut builder = MessageBuilder::new(msg_type, flags);
        builder.set_seq(seq);
        builder.set_pid(pid);
        builder.append_bytes(payload);
        builder.finish()
    }

    fn scripted(
        datagrams: Vec<(Vec<u8>, u32)>,
    ) -> impl FnMut() -> Result<(Vec<u8>, u32)> {
        let mut queue: VecDeque<_> = datagrams.into();
        move || {
            queue
                .pop_front()
                .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))
        }
    }

    #[test]
    fn test_dump_reassembly() {
        // Two MULTI data datagrams, then an empty DONE.
        let recv = scripted(vec![
            (frame(0x18, NLM_F_MULTI, SEQ, OWN_PID, b"first..."), 0),
            (frame(0x18, NLM_F_MULTI, SEQ, OWN_PID, b"second.."), 0),
            (frame(NlMsgType::DONE, NLM_F_MULTI, SEQ, OWN_PID, &[]), 0),
        ]);
        let payloads = collect_replies(SEQ, OWN_PID, false, 0, recv).unwrap();
        assert_eq!(payloads, vec![b"first...".to_vec(), b"second..".to_vec()]);
    }

    #[test]
    fn test_multiple_messages_in_one_datagram() {
        let mut datagram = frame(0x18, NLM_F_MULTI, SEQ, OWN_PID, b"aaaa");
        datagram.extend_from_slice(&frame(0x18, NLM_F_MULTI, SEQ, OWN_PID, b"bbbb"));
        datagram.extend_from_slice(&frame(
            NlMsgType::DONE,
            NLM_F_MULTI,
            SEQ,
            OWN_PID,
            &0i32.to_ne_bytes(),
        ));
        let recv = scripted(vec![(datagram, 0)]);
        let payloads = collect_replies(SEQ, OWN_PID, false, 0, recv).unwrap();
        assert_eq!(payloads.len(), 2);
    }

    #[test]
    fn test_single_reply_without_multi_terminates() {
        // A non-dump reply carries no DONE; the loop must stop at the
        // first message lacking NLM_F_MULTI.
        let recv = scripted(vec![(frame(0x18, 0, SEQ, OWN_PID, b"only"), 0)]);
        let payloads = collect_replies(SEQ, OWN_PID, false, 0, recv).unwrap();
        assert_eq!(payloads, vec![b"only".to_vec()]);
    }

    #[test]
    fn test_error_reply_enoent() {
        let recv = scripted(vec![(
            frame(NlMsgType::ERROR, 0, SEQ, OWN_PID, &(-2i32).to_ne_bytes()),
            0,
        )]);
        let err = collect_replies(SEQ, OWN_PID, false, 0, recv).unwrap_err();
        assert_eq!(err.errno(), Some(2));
    }

    #[test]
    fn test_error_discards_accumulated_payloads() {
        let recv = scripted(vec![
            (frame(0x18, NLM_F_MULTI, SEQ, OWN_PID, b"partial."), 0),
            (
                frame(NlMsgType::ERROR, 0, SEQ, OWN_PID, &(-5i32).to_ne_bytes()),
                0,
            ),
        ]);
        // EIO after a data message: the partial dump is discarded.
        assert!(collect_replies(SEQ, OWN_PID, false, 0, recv).is_err());
    }

    #[test]
    fn test_dump_interrupted() {
        let recv = scripted(vec![(
            frame(0x18, NLM_F_MULTI | NLM_F_DUMP_INTR, SEQ, OWN_PID, b"data"),
            0,
        )]);
        assert!(matches!(
            collect_replies(SEQ, OWN_PID, false, 0, recv),
            Err(Error::DumpInterrupted)
        ));
    }

    #[test]
    fn test_wrong_sender_pid_fails() {
        let recv = scripted(vec![(frame(0x18, 0, SEQ, OWN_PID, b"data"), 1234)]);
        assert!(matches!(
            collect_replies(SEQ, OWN_PID, false, 0, recv),
            Err(Error::WrongSender { pid: 1234 })
        ));
    }

    #[test]
    fn test_sequence_mismatch_private_socket() {
        let recv = scripted(vec![(frame(0x18, 0, SEQ + 1, OWN_PID, b"data"), 0)]);
        assert!(matches!(
            collect_replies(SEQ, OWN_PID, false, 0, recv),
            Err(Error::SequenceMismatch {
                expected: SEQ,
                actual,
            }) if actual == SEQ + 1
        ));
    }

    #[test]
    fn test_sequence_mismatch_shared_socket_skips() {
        // Interleaved reply for another exchange, then ours.
        let recv = scripted(vec![
            (frame(0x18, 0, SEQ + 9, OWN_PID, b"not ours"), 0),
            (frame(0x18, 0, SEQ, OWN_PID, b"ours"), 0),
        ]);
        let payloads = collect_replies(SEQ, OWN_PID, true, 0, recv).unwrap();
        assert_eq!(payloads, vec![b"ours".to_vec()]);
    }

    #[test]
    fn test_other_destination_pid_skipped() {
        let recv = scripted(vec![
            (frame(0x18, 0, SEQ, OWN_PID + 1, b"not ours"), 0),
            (frame(0x18, 0, SEQ, OWN_PID, b"ours"), 0),
        ]);
        let payloads = collect_replies(SEQ, OWN_PID, false, 0, recv).unwrap();
        assert_eq!(payloads, vec![b"ours".to_vec()]);
    }

    #[test]
    fn test_res_type_filter() {
        let recv = scripted(vec![
            (frame(0x20, NLM_F_MULTI, SEQ, OWN_PID, b"wrong type"), 0),
            (frame(0x18, 0, SEQ, OWN_PID, b"right type"), 0),
        ]);
        let payloads = collect_replies(SEQ, OWN_PID, false, 0x18, recv).unwrap();
        assert_eq!(payloads, vec![b"right type".to_vec()]);
    }

    #[test]
    fn test_request_frames_header() {
        let mut req = NetlinkRequest::new(0x23, 0x05);
        req.append_attr_u32(1, 9);
        let bytes = req.builder.clone().finish();
        let header = crate::netlink::message::NlMsgHdr::from_bytes(&bytes).unwrap();
        assert_eq!(header.nlmsg_type, 0x23);
        // NLM_F_REQUEST is forced on.
        assert_eq!(header.nlmsg_flags & NLM_F_REQUEST, NLM_F_REQUEST);
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN + 8);
    }

    #[test]
    fn test_shared_handle_sequence_scope() {
        let Ok(handle) = SocketHandle::new(Protocol::Generic) else {
            return;
        };
        let first = handle.next_seq();
        let second = handle.next_seq();
        assert_eq!(second, first + 1);
    }
}
