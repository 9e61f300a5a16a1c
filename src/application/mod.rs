pub mod dns;
pub mod http;

use dns::DnsMessage;
use http::HttpMessage;

// トランスポート層の上でデコードされたアプリケーション層
#[derive(Debug, Clone)]
pub enum Application {
    Http(HttpMessage),
    Dns(DnsMessage),
}
