//! Placeholder [`AgentBackend`] wired into the daemon until a concrete
//! external agent runtime is plugged in. The runtime itself is out of
//! scope for this crate (see [`dork_session::backend`]); this stub lets
//! the session manager, scheduler, and HTTP surface run end-to-end while
//! that integration is built separately.

use async_trait::async_trait;
use dork_session::{AgentBackend, BackendEvent, BackendStream, DispatchRequest};
use tokio_util::sync::CancellationToken;

pub struct UnimplementedBackend;

#[async_trait]
impl AgentBackend for UnimplementedBackend {
    async fn dispatch(
        &self,
        request: DispatchRequest,
        _cancellation: CancellationToken,
    ) -> Result<BackendStream, dork_core::SessionError> {
        let _ = request;
        let stream = async_stream::stream! {
            yield BackendEvent::Error {
                message: "no agent runtime configured".to_owned(),
                fatal: true,
            };
            yield BackendEvent::Done;
        };
        Ok(Box::pin(stream))
    }
}
