//! The authenticated request pipeline: bearer attachment, response
//! inspection, single-flight token refresh and the end-of-session flow.

pub mod api_client;
pub mod error;
pub mod interceptors;
pub mod notice;
pub mod refresh;
pub mod transport;
pub mod unauthorized;

#[cfg(test)]
pub(crate) mod testing;

pub use api_client::{AuthClient, ClientHooks};
pub use error::ApiError;
pub use notice::{Notice, NoticeCategory, Notifier, TracingNotifier};
pub use refresh::RefreshCoordinator;
pub use transport::{
    ApiRequest, RawResponse, ReqwestTransport, RequestKind, Transport, TransportError,
};
pub use unauthorized::{
    EpisodePhase, LoginRedirect, Navigator, Prompter, TracingNavigator, UnauthorizedHandler,
};
