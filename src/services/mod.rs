// Typed URL sync services
// Services provide the association pass and its collaborators: codec, merge, fixup, crypto, settings.

pub mod crypto_service;
pub mod error_handler;
pub mod history_fixup;
pub mod settings_engine;
pub mod typed_url_associator;
pub mod typed_url_codec;
pub mod typed_url_merge;
