//! Request targets for the Redash REST API.
//!
//! Every builder is a pure function of the credential and an identifier.
//! The API key travels as the `api_key` query-string credential.

use std::fmt::Display;

use url::form_urlencoded::byte_serialize;

use crate::config::Credential;

fn api_key_param(cred: &Credential) -> String {
    byte_serialize(cred.api_key().as_bytes()).collect()
}

/// `POST` target that starts (or reuses) an execution of a saved query.
pub fn query_results(cred: &Credential, query_id: impl Display) -> String {
    format!(
        "{}/api/queries/{}/results?api_key={}",
        cred.endpoint(),
        query_id,
        api_key_param(cred)
    )
}

/// `GET` target reporting the status of a job.
pub fn job(cred: &Credential, job_id: impl Display) -> String {
    format!(
        "{}/api/jobs/{}?api_key={}",
        cred.endpoint(),
        job_id,
        api_key_param(cred)
    )
}

/// `GET` target returning a finished query result.
pub fn query_result(cred: &Credential, result_id: impl Display) -> String {
    format!(
        "{}/api/query_results/{}?api_key={}",
        cred.endpoint(),
        result_id,
        api_key_param(cred)
    )
}

/// Human-facing page of a query, used in error messages. Carries no key.
pub fn query_page(cred: &Credential, query_id: impl Display) -> String {
    format!("{}/queries/{}", cred.endpoint(), query_id)
}
