pub mod error;
pub mod models;
pub mod params;
pub mod repo;

mod memory;
pub use memory::MemoryStore;

pub use error::{StoreError, StoreResult};
pub use models::{Folder, ItemKind, Note, NoteVersion, Tags, Trash, User, UserInfo};
pub use params::{FolderPatch, FolderScope, ItemFilter, NewFolder, NewNote, NewUser, NotePatch};
pub use repo::{ItemStore, Repository};
