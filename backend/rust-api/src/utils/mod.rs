pub mod retry;
pub mod slug;
pub mod time;
