pub mod acl;
pub mod auth;
pub mod router;
pub mod source;
pub mod sourcetable;
pub mod user;

pub use acl::{AclStore, MountAcl};
pub use auth::{authorize, Denial};
pub use router::{AdmissionError, Client, ClientKind, Router};
pub use source::SourceSink;
pub use sourcetable::{html_response, is_browser, ntrip_response, RenderContext, Sourcetable, SourcetableStore};
pub use user::User;
