pub mod error;
pub mod openai;
pub mod traits;
pub mod util;

pub use error::AiError;
pub use openai::{OpenAi, StructuredOutput};
pub use traits::{extract, Message, MessageRole, StructuredAgent};
pub use util::{strip_code_blocks, truncate_to_char_boundary};
