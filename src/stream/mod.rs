//! Segmented stream buffering between a producer and a consumer.
//!
//! A [`Stream`] is a logically-circular byte buffer built from fixed-size
//! segments. A decode thread acquires the [`StreamProducer`] handle and
//! writes ahead; a playback callback acquires the [`StreamConsumer`] and
//! drains behind it. Space consumed on one side is recycled to the other
//! through explicit commits, so neither side ever blocks and neither side
//! allocates.

pub mod accessor;
pub mod profile;
pub mod ring;
pub mod segment;

pub use accessor::{FileTransfer, Role, StreamConsumer, StreamProducer};
pub use profile::TransferProfile;
pub use ring::Stream;
