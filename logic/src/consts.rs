/// Width in bytes of an [`crate::Id`]: 160 bits.
pub const ID_LEN: usize = 20;

/// Width in bits of an [`crate::Id`], also the depth bound of the [`crate::ktree::BucketTree`].
pub const ID_LEN_BITS: usize = ID_LEN * 8;
