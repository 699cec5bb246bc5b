//! Service layer: url-addressed call and navigation.
//!
//! [`CallInvoker`] resolves a url to a declared method, binds the payload
//! and invokes the target operation. [`NavigationResolver`] resolves a url
//! to a declared page and hands a typed bundle to the host's
//! [`Navigator`].

pub mod call_invoker;
pub mod navigation;

pub use call_invoker::CallInvoker;
pub use navigation::{NavigationMode, NavigationRequest, NavigationResolver, Navigator};
