/// HTTP gateway implementation.
///
/// Exposes registered models over the uniform `/api/v1/models` CRUD+search
/// contract, with session-token authentication resolved per request.
pub mod gateway;
pub mod session;

pub use gateway::{build_router, serve, AppState};
pub use session::SessionMap;
