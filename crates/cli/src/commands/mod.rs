pub mod doctor;
pub mod generate;
pub mod headings;
pub mod init;
pub mod scan;
pub mod serve;
