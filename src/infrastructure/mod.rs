pub mod notifier;
pub mod retailers;
pub mod storage;
