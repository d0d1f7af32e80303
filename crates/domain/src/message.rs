//! Helpers over the hickory wire message shared by the pipeline and its
//! transport-layer callers.

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::RData;
use std::net::IpAddr;

/// Starts a reply for `req`: same ID, question section copied, NOERROR.
pub fn reply_to(req: &Message) -> Message {
    let mut reply = Message::new();
    reply.set_id(req.id());
    reply.set_message_type(MessageType::Response);
    reply.set_op_code(OpCode::Query);
    reply.set_recursion_desired(req.recursion_desired());
    reply.set_recursion_available(true);
    reply.add_queries(req.queries().iter().cloned());
    reply.set_response_code(ResponseCode::NoError);
    reply
}

/// Well-formed SERVFAIL preserving the request's ID and question, for the
/// transport layer to return when routing fails.
pub fn servfail_reply(req: &Message) -> Message {
    let mut reply = reply_to(req);
    reply.set_response_code(ResponseCode::ServFail);
    reply
}

/// First A/AAAA address in the answer section, if any.
pub fn first_answer_ip(msg: &Message) -> Option<IpAddr> {
    msg.answers().iter().find_map(|record| match record.data() {
        RData::A(a) => Some(IpAddr::V4(a.0)),
        RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
        _ => None,
    })
}

/// Canonical rcode label as it appears in query logs.
pub fn rcode_name(code: ResponseCode) -> String {
    match code {
        ResponseCode::NoError => "NOERROR".to_string(),
        ResponseCode::FormErr => "FORMERR".to_string(),
        ResponseCode::ServFail => "SERVFAIL".to_string(),
        ResponseCode::NXDomain => "NXDOMAIN".to_string(),
        ResponseCode::NotImp => "NOTIMP".to_string(),
        ResponseCode::Refused => "REFUSED".to_string(),
        other => format!("RCODE{}", u16::from(other.low())),
    }
}
