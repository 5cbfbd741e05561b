use crate::interface::Interface;
use crossbeam::channel::Sender;

/// The router's contact surface with the I/O layer. The router hands every
/// outbound frame, fully built, to `send_frame`; whether transmission
/// blocks is the I/O layer's business. The bytes are only borrowed for the
/// duration of the call.
pub trait FrameSink {
    fn send_frame(&self, iface: &Interface, frame: &[u8]);
}

/// Sink that copies every outbound frame into a channel, tagged with the
/// egress interface name, so tests can inspect the router's output.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: Sender<(String, Vec<u8>)>,
}

impl ChannelSink {
    pub fn new(sender: Sender<(String, Vec<u8>)>) -> ChannelSink {
        ChannelSink { sender }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, iface: &Interface, frame: &[u8]) {
        if self
            .sender
            .send((iface.name.clone(), frame.to_vec()))
            .is_err()
        {
            panic!("Channel sink: receiver side went away");
        }
    }
}
