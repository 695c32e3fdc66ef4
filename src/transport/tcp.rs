use crate::base::error::{IoResultExt, NetError};
use crate::pool::address::HostAddress;
use crate::transport::{Connector, EstablishedTransport};
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Plaintext connector: DNS -> TCP -> optional HTTP CONNECT tunnel.
///
/// Secure addresses are rejected; embedders wanting TLS wrap or replace
/// this with a [`Connector`] that performs the handshake and reports the
/// ALPN result.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn establish(
        &self,
        address: HostAddress,
        _protocols: Vec<String>,
    ) -> BoxFuture<'static, Result<EstablishedTransport, NetError>> {
        Box::pin(async move {
            if address.secure {
                tracing::debug!(host = %address.host, "plaintext connector cannot serve a secure address");
                return Err(NetError::HandshakeFailed);
            }

            // With a proxy we connect to the proxy endpoint first.
            let (connect_host, connect_port) = match &address.proxy {
                Some(proxy) => (
                    proxy.host().ok_or(NetError::InvalidUrl)?.to_string(),
                    proxy.port().ok_or(NetError::InvalidUrl)?,
                ),
                None => (address.host.clone(), address.port),
            };

            // 1. DNS resolution
            let addrs = tokio::net::lookup_host(format!("{}:{}", connect_host, connect_port))
                .await
                .map_err(|_| NetError::NameNotResolved)?;

            // 2. TCP connect, first address that answers wins
            let mut stream = None;
            for addr in addrs {
                if let Ok(s) = TcpStream::connect(addr).await {
                    stream = Some(s);
                    break;
                }
            }
            let mut stream = stream.ok_or(NetError::ConnectionFailed)?;

            // 3. HTTP CONNECT tunnel to the final destination
            if address.proxy.is_some() {
                let target = format!("{}:{}", address.host, address.port);
                let connect_req = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
                stream.write_all(connect_req.as_bytes()).await.net_context("proxy connect")?;

                let mut buf = [0u8; 1024];
                let n = stream.read(&mut buf).await.net_context("proxy response")?;
                let response = String::from_utf8_lossy(&buf[..n]);
                if !response.starts_with("HTTP/1.1 200") && !response.starts_with("HTTP/1.0 200") {
                    tracing::debug!(%target, "proxy tunnel refused");
                    return Err(NetError::TunnelConnectionFailed);
                }
            }

            Ok(EstablishedTransport {
                stream: Box::new(stream),
                protocol: "http/1.1".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn rejects_secure_addresses() {
        let url = Url::parse("https://example.com").unwrap();
        let address = HostAddress::from_url(&url, None).unwrap();
        let result = TcpConnector.establish(address, vec!["h2".to_string()]).await;
        assert_eq!(result.err(), Some(NetError::HandshakeFailed));
    }

    #[tokio::test]
    async fn connects_to_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let address = HostAddress::from_url(&url, None).unwrap();
        let transport = TcpConnector.establish(address, Vec::new()).await.unwrap();
        assert_eq!(transport.protocol, "http/1.1");
    }
}
