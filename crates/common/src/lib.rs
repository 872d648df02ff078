/**
 * Cryptographic types and operations.
 *  - Signing and encryption key pairs
 *  - Content keys, per-recipient key wrapping
 *  - Pre-shared secret authentication
 */
pub mod crypto;
/**
 * Keyed principals and their sign / encrypt
 *  operations over envelopes.
 */
pub mod entity;
/**
 * The versioned, self-describing container
 *  every record and message travels in.
 */
pub mod envelope;
/**
 * Name, id and tag directory used to route
 *  certificates to CAs and nodes.
 */
pub mod index;
/**
 * Certificate authorities, CSRs and issued
 *  certificates.
 */
pub mod pki;
/**
 * Node registration and admin invite over
 *  the shared stores.
 */
pub mod protocol;
/**
 * Queue and kv store collaborators.
 */
pub mod store;

pub mod prelude {
    pub use crate::entity::{Entity, EntityError};
    pub use crate::envelope::{decode, encode, kinds, Envelope, EnvelopeError, SignatureMode};
    pub use crate::index::{normalize_tag, IndexError, ObjectKind, SharedSecret, TagIndex};
    pub use crate::pki::{CaRecord, CertRecord, CertificateAuthority, CsrRecord, X509Authority};
    pub use crate::protocol::invite::{complete_invite, request_invite};
    pub use crate::protocol::organization::public_organization;
    pub use crate::protocol::{
        create_node, create_organization, Context, DrainReport, ProtocolError,
    };
    pub use crate::store::{
        Channel, Direction, FsStore, KvStore, MemoryStore, QueueStore, StoreError,
    };
}
