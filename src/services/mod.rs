//! Core services: the token store, the remote drive client, and the upload
//! pipeline that ties them together.

pub mod access_token;
pub mod graph_client;
pub mod object_storage;
pub mod token_store;
pub mod upload_service;
