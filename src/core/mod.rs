pub mod cms;
pub mod download;
pub mod html_parser;
pub mod portal;
