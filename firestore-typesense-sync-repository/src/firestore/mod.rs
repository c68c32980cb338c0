//! Firestore implementation of the document store.

mod rest_store;
mod value_codec;

pub use rest_store::FirestoreRestStore;
pub use value_codec::ValueCodec;
