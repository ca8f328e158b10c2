use crate::{Data, Error};

pub mod ascii;
pub mod chat;
pub mod general;
pub mod image;
pub mod search;
pub mod speech;
pub mod stream;
pub mod summary;

/// Every command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        general::ping(),
        chat::oai(),
        chat::xai(),
        stream::oais(),
        stream::xais(),
        search::search(),
        image::gen(),
        summary::summarize(),
        speech::tts(),
        ascii::ascii(),
    ]
}
