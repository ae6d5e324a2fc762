/// `ip:port` string a node can be dialed at.
pub type Address = String;

/// Position on the hash ring. The ring size is `2^HashPos::BITS`, so all
/// modular arithmetic is the wrapping arithmetic of this type.
pub type HashPos = u64;
