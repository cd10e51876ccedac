//! Persistable entity contract

use serde::Serialize;

/// An entity a unit of work can persist
///
/// `KIND` names the collection or table the entity lives in; `key` is its
/// identity within that collection.
pub trait Entity: Serialize + Send + Sync {
    const KIND: &'static str;

    fn key(&self) -> String;
}
