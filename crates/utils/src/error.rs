use std::{fmt::Display, io, path::Path};

use thiserror::Error;
use tracing::error;

/// Report an error with tracing
pub fn report_error(res: &Result<(), impl Display>, context: &str) {
	if let Err(e) = res {
		error!("{context}: {e:#}");
	}
}

/// I/O failure on a snapshot or config file, tagged with the operation and path
#[derive(Error, Debug)]
#[error("{context}: {source}; path: '{}'", .path.display())]
pub struct FileIOError {
	pub context: &'static str,
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
}

impl FileIOError {
	pub fn new(context: &'static str, path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> Self {
		let path = path.as_ref().into();
		move |source| Self {
			context,
			path,
			source,
		}
	}

	pub fn is_not_found(&self) -> bool {
		self.source.kind() == io::ErrorKind::NotFound
	}
}
