//! Shared domain types for the clinic backend.

pub mod consultation;
pub mod message;

pub use {
    consultation::{Consultation, ConsultationStatus, Doctor},
    message::{
        Attachment, Author, AuthorRole, ConsultationId, Message, MessageBody, MessageRecord,
        RecordError, absolute_url,
    },
};
