//! OpenAPI documentation for the assistant route, served at `/api/openapi.json`.

pub(crate) mod extra_types;

use utoipa::OpenApi;

use crate::{api, envelope};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "threadline",
        description = "Relay between the chat page and a hosted assistant. Replies stream as `code:json` lines: \
                       `0` text delta, `3` error, `4` assistant message, `5` control data `{threadId, messageId}`, `6` data message."
    ),
    paths(api::handlers::assistant::send_message),
    components(schemas(
        envelope::ChatRequest,
        envelope::FileUpload,
        extra_types::ClientErrorResponse,
        extra_types::ServerErrorResponse,
        extra_types::ServerError,
    )),
    tags(
        (name = "assistant", description = "Messages and streamed replies"),
    )
)]
pub struct ApiDoc;
