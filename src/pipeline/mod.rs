pub mod archive;
pub mod intake;
pub mod ledger;
pub mod poller;
pub mod processor;
pub mod quarantine;
pub mod routing;
pub mod validation;
