mod helpers;
mod mocks;

mod admin;
mod callbacks;
mod creators;
mod payments;
mod server;
