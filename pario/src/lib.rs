pub use pario_session::*;
pub use {pario_box as boxes, pario_dtype as dtype, pario_error as error};
