use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}

pub fn middleware() -> AuthMiddleware {
    AuthMiddleware::new()
}
