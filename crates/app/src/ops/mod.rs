pub mod admin;
pub mod init;
pub mod node;
pub mod org;
pub mod version;

pub use admin::Admin;
pub use init::Init;
pub use node::Node;
pub use org::Org;
pub use version::Version;
