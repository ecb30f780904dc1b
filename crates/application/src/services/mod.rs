mod account_service;
mod chat_service;

#[cfg(test)]
mod account_service_tests;

pub use account_service::{
    AccountPolicy, AccountService, AccountServiceDependencies, LoginRequest,
    RecordActivityRequest, RegisterRequest, UpdateAccountRequest, UpdatePreferencesRequest,
};
pub use chat_service::{
    ChatHistoryRequest, ChatLimits, ChatService, ChatServiceDependencies, CreateSessionRequest,
    ListSessionsRequest, SearchMessagesRequest, SendMessageRequest, UpdateSessionRequest,
    DEFAULT_HISTORY_PAGE_SIZE, DEFAULT_SEARCH_PAGE_SIZE, DEFAULT_SESSION_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
