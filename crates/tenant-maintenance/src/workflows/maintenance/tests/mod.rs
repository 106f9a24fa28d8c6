mod common;
mod notifier;
