//! Event dispatch from a receiver to a listener

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::traits::{TransportEvent, TransportListener, TransportReceiver};

/// Forward every event from `receiver` to `listener` until the stream ends
///
/// Error events are remembered and reported with the next disconnect, so a
/// listener sees a failure together with the close it caused.
pub async fn pump_events<R>(mut receiver: R, listener: Arc<dyn TransportListener>)
where
    R: TransportReceiver,
{
    let mut last_error: Option<TransportError> = None;

    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Connected => {
                debug!("Transport connected");
                last_error = None;
                listener.on_connect();
            }
            TransportEvent::Data(data) => {
                listener.on_message_received(&data);
            }
            TransportEvent::Disconnected { reason } => {
                info!("Transport disconnected: {:?}", reason);
                let error = last_error
                    .take()
                    .or_else(|| reason.map(TransportError::ConnectionLost));
                listener.on_connection_closed(error.as_ref());
            }
            TransportEvent::Error(e) => {
                warn!("Transport error: {}", e);
                last_error = Some(TransportError::Other(e));
            }
        }
    }

    debug!("Transport event stream ended");
}
