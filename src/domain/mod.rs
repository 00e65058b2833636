pub mod action;
pub mod category;
pub mod contact;
pub mod link;
pub mod report;
pub mod requester;
