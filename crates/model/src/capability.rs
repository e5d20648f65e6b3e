/// Whether the peer accepts the windowed stack trace command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowedStack {
	/// Not tried yet.
	#[default]
	Unknown,
	Supported,
	/// Rejected once; never tried again in this session.
	Unsupported,
}

/// Capabilities learned by probing. Sticky for the lifetime of the session.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
	windowed_stack: WindowedStack,
}

impl Capabilities {
	pub fn windowed_stack(&self) -> WindowedStack {
		self.windowed_stack
	}

	pub(crate) fn allows_windowed_stack(&self) -> bool {
		self.windowed_stack != WindowedStack::Unsupported
	}

	pub(crate) fn note_windowed_stack(&mut self, supported: bool) {
		if self.windowed_stack == WindowedStack::Unsupported {
			return;
		}
		self.windowed_stack = if supported { WindowedStack::Supported } else { WindowedStack::Unsupported };
	}
}
