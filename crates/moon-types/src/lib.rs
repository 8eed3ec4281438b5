pub mod checks;
pub mod comment;
pub mod favorite;
pub mod ids;
pub mod membership;
pub mod pages;
pub mod subject;
pub mod text;
pub mod timeline;
pub mod validation;

pub use checks::*;
pub use comment::*;
pub use favorite::*;
pub use ids::*;
pub use membership::*;
pub use pages::*;
pub use subject::*;
pub use text::*;
pub use timeline::*;
pub use validation::*;

/// Entities the query cache can locate by `(type_name, id)` wherever they
/// appear inside cached responses.
pub trait Normalized {
    const TYPE_NAME: &'static str;
}
