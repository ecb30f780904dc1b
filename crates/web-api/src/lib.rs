//! Web API 层。
//!
//! 以 JSON RPC 的形式暴露 `user.UserService` 与 `chat.ChatService`，
//! 请求解析后委托给应用层的用例服务。

mod chat_routes;
mod error;
mod routes;
mod rpc;
mod state;
mod user_routes;

pub use error::{ApiError, ErrorBody, INTERNAL_ERROR_MESSAGE};
pub use routes::{chat_router, user_router};
pub use rpc::{Done, Reply};
pub use state::{ChatApiState, UserApiState};
