use axum::Json;
use serde_json::{json, Value};

fn job_response(description: &str) -> Value {
    json!({"description": description, "schema": {"$ref": "#/definitions/Job"}})
}

fn error_response(description: &str) -> Value {
    json!({"description": description, "schema": {"$ref": "#/definitions/Error"}})
}

fn post_job() -> Value {
    json!({
        "operationId": "postJob",
        "summary": "Queue an event log. A JSON body names a remote log; any other body is the log itself.",
        "consumes": ["application/json", "text/csv"],
        "parameters": [
            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/JobSubmission"}},
            {"name": "callback_endpoint", "in": "query", "type": "string", "required": false},
            {"name": "case", "in": "query", "type": "string", "required": false},
            {"name": "activity", "in": "query", "type": "string", "required": false},
            {"name": "resource", "in": "query", "type": "string", "required": false},
            {"name": "start_timestamp", "in": "query", "type": "string", "required": false},
            {"name": "end_timestamp", "in": "query", "type": "string", "required": false}
        ],
        "responses": {
            "201": job_response("Job queued"),
            "400": error_response("Invalid submission"),
            "413": error_response("Body over the size limit")
        }
    })
}

fn paths() -> Value {
    json!({
        "/jobs": {
            "get": {
                "operationId": "listJobs",
                "summary": "List every job, oldest first.",
                "responses": {
                    "200": {"description": "All jobs", "schema": {"$ref": "#/definitions/JobList"}}
                }
            },
            "post": post_job(),
            "delete": {
                "operationId": "deleteJobs",
                "summary": "Remove every job and its files.",
                "responses": {
                    "200": {"description": "Queue is empty", "schema": {"$ref": "#/definitions/JobList"}},
                    "409": error_response("A job is running")
                }
            }
        },
        "/jobs/{id}": {
            "get": {
                "operationId": "getJob",
                "parameters": [{"name": "id", "in": "path", "type": "string", "required": true}],
                "responses": {
                    "200": job_response("The job"),
                    "404": error_response("Unknown job")
                }
            }
        },
        "/jobs/{id}/cancel": {
            "get": {
                "operationId": "cancelJob",
                "summary": "Fail a pending job, or interrupt a running one.",
                "parameters": [{"name": "id", "in": "path", "type": "string", "required": true}],
                "responses": {
                    "200": job_response("Pending job cancelled"),
                    "202": job_response("Running job is being interrupted"),
                    "400": error_response("Job already finished"),
                    "404": error_response("Unknown job")
                }
            }
        },
        "/callback": {
            "post": {
                "operationId": "postCallback",
                "summary": "Sample receiver echoing a completion notification.",
                "parameters": [
                    {"name": "body", "in": "body", "required": true, "schema": {"$ref": "#/definitions/Callback"}}
                ],
                "responses": {
                    "200": {"description": "Echoed payload", "schema": {"$ref": "#/definitions/Callback"}},
                    "400": error_response("Malformed payload")
                }
            }
        }
    })
}

fn definitions() -> Value {
    json!({
        "JobSubmission": {
            "type": "object",
            "required": ["event_log"],
            "properties": {
                "event_log": {"type": "string", "format": "uri"},
                "callback_endpoint": {"type": "string", "format": "uri"},
                "column_mapping": {"type": "object", "additionalProperties": {"type": "string"}}
            }
        },
        "Job": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "status": {"type": "string", "enum": ["pending", "running", "completed", "duplicate", "failed"]},
                "error": {"type": "string"},
                "result": {"type": "object"},
                "report_csv": {"type": "string", "format": "uri"},
                "callback_endpoint": {"type": "string", "format": "uri"},
                "event_log": {"type": "string", "format": "uri"},
                "column_mapping": {"type": "object", "additionalProperties": {"type": "string"}},
                "created_at": {"type": "string", "format": "date-time"},
                "finished_at": {"type": "string", "format": "date-time"}
            }
        },
        "JobList": {
            "type": "object",
            "properties": {"jobs": {"type": "array", "items": {"$ref": "#/definitions/Job"}}}
        },
        "Callback": {
            "type": "object",
            "required": ["job_id", "status"],
            "properties": {
                "job_id": {"type": "string"},
                "status": {"type": "string"},
                "error": {"type": "string"}
            }
        },
        "Error": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "message": {"type": "string"},
                "code": {"type": "integer"},
                "className": {"type": "string"},
                "errors": {"type": "object"}
            }
        }
    })
}

/// Swagger 2.0 description of the HTTP API.
pub fn document() -> Value {
    json!({
        "swagger": "2.0",
        "info": {
            "title": "Waiting time analysis API",
            "description": "Identifies activity transitions in an event log and analyses their waiting times.",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "basePath": "/",
        "schemes": ["http"],
        "consumes": ["application/json"],
        "produces": ["application/json"],
        "paths": paths(),
        "definitions": definitions(),
    })
}

pub async fn swagger_json() -> Json<Value> {
    Json(document())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_described() {
        let doc = document();
        for path in ["/jobs", "/jobs/{id}", "/jobs/{id}/cancel", "/callback"] {
            assert!(doc["paths"][path].is_object(), "{} missing", path);
        }
        assert_eq!(doc["swagger"], "2.0");
    }
}
