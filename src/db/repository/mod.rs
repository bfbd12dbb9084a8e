pub mod location;
pub mod share;
pub mod user;

pub use location::LocationRepository;
pub use share::ShareRepository;
pub use user::UserRepository;
