//! Message bus protocol: envelope, lineage, predicates and tags.

pub mod message;
pub mod predicate;
pub mod tags;

pub use message::{
    combine_seeds, error, node, processing, ready, MarkerStatus, Message, Payload, Seeds, Status,
    UNIDENTIFIED,
};
pub use predicate::{StatusPattern, TagPattern, TypePredicate, PREFIX_SENTINEL};
pub use tags::{scoped_tag, split_scoped_tag, MarkerId, ID_SEPARATOR};
