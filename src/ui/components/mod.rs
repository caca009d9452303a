pub mod chat_list;
pub mod conversation;
pub mod input;
pub mod presence;
