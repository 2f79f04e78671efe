mod conversation;

pub use conversation::{
    ContextUpdate, ConversationMemory, NewTurn, KEY_INQUIRY_LOCATION, KEY_SELECTED_OUTLET,
};
