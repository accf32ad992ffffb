//! Wiring between event publishers and subscribers.
//!
//! 1. Build an [`EventHooks`] and register one async function per event type you care about.
//! 2. Turn it into [`EventHandlers`] with `EventHandlers::new(buffer_size, hooks)`.
//! 3. Hand `handlers.producers()` to the APIs that publish events, then call `handlers.start_handlers()`.
//!
//! Producers from several `EventHandlers` can be combined with [`EventProducers::merge`], so independent
//! subscribers (fraud checks, operator alerts) can each have their own handler set.
use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    CreatorPriceChangedEvent,
    EarningClearedEvent,
    EarningPostedEvent,
    EarningRefundedEvent,
    EventHandler,
    EventProducer,
    FlagRaisedEvent,
    Handler,
    PaymentFailedEvent,
    PayoutDeniedEvent,
};

macro_rules! event_hooks {
    ($($event:ty => $hook:ident, $producer:ident;)+) => {
        #[derive(Default, Clone)]
        pub struct EventProducers {
            $(pub $producer: Vec<EventProducer<$event>>,)+
        }

        impl EventProducers {
            /// Combines the subscribers of two producer sets.
            pub fn merge(mut self, other: EventProducers) -> Self {
                $(self.$producer.extend(other.$producer);)+
                self
            }
        }

        pub struct EventHandlers {
            $(pub $hook: Option<EventHandler<$event>>,)+
        }

        impl EventHandlers {
            pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
                Self { $($hook: hooks.$hook.map(|f| EventHandler::new(buffer_size, f)),)+ }
            }

            pub fn producers(&self) -> EventProducers {
                let mut result = EventProducers::default();
                $(
                    if let Some(handler) = &self.$hook {
                        result.$producer.push(handler.subscribe());
                    }
                )+
                result
            }

            /// Spawns a task per registered handler. Each one stops when all of its producers have been dropped.
            pub async fn start_handlers(self) {
                $(
                    if let Some(handler) = self.$hook {
                        tokio::spawn(async move {
                            handler.start_handler().await;
                        });
                    }
                )+
            }
        }

        #[derive(Default, Clone)]
        pub struct EventHooks {
            $(pub $hook: Option<Handler<$event>>,)+
        }

        impl EventHooks {
            $(
                pub fn $hook<F>(&mut self, f: F) -> &mut Self
                where F: (Fn($event) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
                    self.$hook = Some(Arc::new(f));
                    self
                }
            )+
        }
    };
}

event_hooks! {
    EarningPostedEvent => on_earning_posted, earning_posted_producer;
    EarningClearedEvent => on_earning_cleared, earning_cleared_producer;
    EarningRefundedEvent => on_earning_refunded, earning_refunded_producer;
    PaymentFailedEvent => on_payment_failed, payment_failed_producer;
    PayoutDeniedEvent => on_payout_denied, payout_denied_producer;
    FlagRaisedEvent => on_flag_raised, flag_raised_producer;
    CreatorPriceChangedEvent => on_creator_price_changed, creator_price_changed_producer;
}
