use std::sync::Arc;

use application::{AccountService, ChatService};

#[derive(Clone)]
pub struct UserApiState {
    pub account_service: Arc<AccountService>,
}

impl UserApiState {
    pub fn new(account_service: Arc<AccountService>) -> Self {
        Self { account_service }
    }
}

#[derive(Clone)]
pub struct ChatApiState {
    pub chat_service: Arc<ChatService>,
}

impl ChatApiState {
    pub fn new(chat_service: Arc<ChatService>) -> Self {
        Self { chat_service }
    }
}
