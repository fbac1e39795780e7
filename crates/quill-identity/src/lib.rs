/// Quill identity primitives.
///
/// Credentials are write-only: `password` exposes hashing and
/// verification but no way to read a password back, and the hash itself
/// never leaves the storage layer. `token` issues and checks the signed,
/// time-limited envelopes used for account confirmation.
pub mod password;
pub mod token;
