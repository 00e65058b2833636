pub mod assets;
pub mod auth;
pub mod categories;
pub mod contact;
pub mod duplicates;
pub mod error;
pub mod identifiers;
pub mod links;
pub mod moderation;
pub mod reports;
pub mod slugs;
