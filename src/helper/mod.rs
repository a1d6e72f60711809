pub mod api_error;
pub mod blog_helpers;
pub mod form_helpers;
pub mod proxy_helpers;
pub mod sanitization_helpers;
pub mod session_helpers;
pub mod slug_helpers;
pub mod sync_helpers;
