//! Packing and unpacking between hickory messages and wire bytes.

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable, BinEncoder};
use janus_dns_domain::ForwardError;

pub fn pack(msg: &Message) -> Result<Vec<u8>, ForwardError> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    msg.emit(&mut encoder)
        .map_err(|e| ForwardError::Pack(e.to_string()))?;
    Ok(buf)
}

pub fn unpack(bytes: &[u8]) -> Result<Message, ForwardError> {
    Message::from_bytes(bytes).map_err(|e| ForwardError::Unpack(e.to_string()))
}
