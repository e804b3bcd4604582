pub mod apns;
pub mod c2dm;
