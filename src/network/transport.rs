use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{ClientError, Result};

pub type ChannelStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the websocket, presenting the bearer token in the handshake.
pub async fn build_transport(url: &str, token: &str) -> Result<ChannelStream> {
    let mut request = url
        .into_client_request()
        .map_err(|err| ClientError::InvalidUrl(format!("{url}: {err}")))?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, bearer_header(token)?);

    let (stream, response) = connect_async(request).await?;
    log::debug!("Channel handshake with {url} answered {}", response.status());
    Ok(stream)
}

fn bearer_header(token: &str) -> Result<HeaderValue> {
    let mut value =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ClientError::InvalidToken)?;
    value.set_sensitive(true);
    Ok(value)
}
