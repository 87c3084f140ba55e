//! Authentication module
//!
//! This module provides JWT-based authentication with the following components:
//! - Token generation and validation
//! - Password hashing with Argon2
//! - Revocation registry for logged-out tokens
//! - Middleware for request authentication
//! - Authentication service for registration, login and profiles

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod service;

pub use jwt::{generate_access_token, validate_access_token, Claims, JwtConfig, JwtError};
pub use middleware::{auth_middleware, AuthError, AuthenticatedUser, CurrentUser};
pub use password::{hash_password_with_config, verify_password, PasswordConfig, PasswordError};
pub use revocation::{
    build_registry, spawn_purge_task, InMemoryRevocationRegistry, RevocationError,
    RevocationRegistry, SqlRevocationRegistry,
};
pub use service::{
    AuthService, LoginRequest, LoginResponse, MessageResponse, ProfileResponse, RegisterRequest,
    RegisterResponse, UpdateProfileRequest, UpdateProfileResponse,
};
