//! Files written to the output directory.
//!
//! # Submodules
//!
//! - [`pages`]: pagination and the per-feed `<stem>.html` / `<stem>_data.json` pair
//! - [`viewer`]: the HTML/JS shell that renders one feed's pages in the browser
//! - [`index`]: `index.html` summarizing every viewer in a directory
//!
//! # Output Structure
//!
//! ```text
//! freshrss_embeds/
//! ├── index.html
//! ├── Indie_Blog.html
//! ├── Indie_Blog_data.json
//! ├── Music.html
//! └── Music_data.json
//! ```

pub mod index;
pub mod pages;
pub mod viewer;
