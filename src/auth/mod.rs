pub mod gate;
pub mod login;
pub mod token;

pub use gate::{AuthGate, Claims, IssuedToken, TOKEN_TTL};
pub use login::{AuthRoutes, LoginRequest, LoginResponse, login_handler};
pub use token::TokenExtractor;
