pub mod candidate_finder;
pub mod collaborators;
pub mod distributor;
pub mod preference_service;
pub mod profile_service;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testutil;
