use actix_web::web::{self};

pub mod routes {
    pub mod r#gen;
}

mod services {
    pub(crate) mod r#gen;
}

mod dtos {
    pub(crate) mod r#gen;
}

pub fn mount_gen() -> actix_web::Scope {
    web::scope("/generate")
        .service(routes::r#gen::post_generate)
        .service(routes::r#gen::get_history)
}
