pub mod message;
pub mod name;

pub use message::{DnsFlags, DnsMessage, DnsQuestion, DnsResourceRecord, Opcode, QueryClass, QueryType, ReplyCode};
pub use name::{decode_name, DomainName, NameKind};
