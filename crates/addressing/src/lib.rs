//! Addressing engine: turns root recipients into per-recipient transport selections.

pub mod configuration;
pub mod context;
pub mod dispatcher;
pub mod evaluator;
pub mod expansion;
pub mod recipient;
pub mod resolver;
pub mod result;
pub mod store;
pub mod transport;

pub use configuration::{HierarchyContinuation, TransportConfiguration};
pub use context::{
    ConstantExpressionEvaluator, EvaluationContext, ExpressionError, SelectionExpressionEvaluator,
};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use recipient::{Recipient, RecipientGraph, RecipientId, RecipientRepository, RecipientType};
pub use resolver::{RecipientResolver, ResolveError};
pub use result::{AddressingError, AddressingResult, SelectedTransport};
pub use transport::{Transport, TransportError, TransportRegistry};
