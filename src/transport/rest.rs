//! Blocking HTTP transport for ArcGIS-style `GeocodeServer` endpoints.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    GeocodeRequest, GeocodeTransport, PropertySet, RecordSet, ReverseGeocodeRequest,
    ServiceMetadata,
};
use crate::config::{GeocoderConfig, ResponseFields};
use crate::error::TransportError;

/// Service error codes meaning the token is missing, invalid or expired.
const AUTH_ERROR_CODES: &[i64] = &[498, 499];

/// Geocoding transport over the service's JSON REST API.
pub struct RestTransport {
    client: Client,
    base: Url,
    token: Option<String>,
    response: ResponseFields,
}

impl RestTransport {
    pub fn new(config: &GeocoderConfig) -> Result<Self, TransportError> {
        let base = Url::parse(&config.service.url)
            .map_err(|e| TransportError::fault(format!("Invalid service url: {}", e)))?;

        let client = Client::builder()
            .user_agent(concat!("locus/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.service.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base,
            token: config.service.token.clone(),
            response: config.response.clone(),
        })
    }

    fn endpoint(&self, operation: Option<&str>, params: &[(&str, String)]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        if let Some(operation) = operation {
            url.path_segments_mut()
                .map_err(|_| TransportError::fault("Service url cannot be a base"))?
                .pop_if_empty()
                .push(operation);
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("f", "json");
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }

    fn get_json(&self, url: Url) -> Result<Value, TransportError> {
        debug!("GET {}", url.path());
        let response = self.client.get(url).send()?;
        read_json(response)
    }

    fn post_form(&self, url: Url, form: &[(&str, String)]) -> Result<Value, TransportError> {
        debug!("POST {}", url.path());
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in form {
            body.append_pair(key, value);
        }
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.finish())
            .send()?;
        read_json(response)
    }
}

fn read_json(response: reqwest::blocking::Response) -> Result<Value, TransportError> {
    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(TransportError::Unauthorized(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(TransportError::fault(format!("HTTP {}", status)));
    }
    Ok(response.json::<Value>()?)
}

/// Turn an in-band `{"error": {...}}` object into a transport error.
fn check_service_error(body: &Value) -> Result<(), TransportError> {
    let Some(error) = body.get("error").filter(|e| e.is_object()) else {
        return Ok(());
    };
    let code = error["code"].as_i64().unwrap_or(0);
    let message = error["message"]
        .as_str()
        .unwrap_or("unknown service error")
        .to_string();

    if AUTH_ERROR_CODES.contains(&code) {
        Err(TransportError::Unauthorized(message))
    } else {
        Err(TransportError::Fault(format!("{} (code {})", message, code)))
    }
}

/// Reverse geocoding reports "nothing here" as a code 400 error.
fn is_not_found(body: &Value) -> bool {
    let error = &body["error"];
    if error["code"].as_i64() != Some(400) {
        return false;
    }
    let mentions_not_found = |v: &Value| {
        v.as_str()
            .map(|s| s.to_ascii_lowercase().contains("unable to find address"))
            .unwrap_or(false)
    };
    mentions_not_found(&error["message"])
        || error["details"]
            .as_array()
            .map_or(false, |details| details.iter().any(mentions_not_found))
}

/// Flatten a `{address, location, score, attributes}` candidate into one
/// property set keyed by the configured response field names.
fn flatten_candidate(candidate: &Value, fields: &ResponseFields) -> PropertySet {
    let mut props = candidate["attributes"]
        .as_object()
        .cloned()
        .unwrap_or_default();

    if candidate["location"].is_object() {
        props.insert(fields.shape.clone(), candidate["location"].clone());
    }
    if !candidate["score"].is_null() {
        props
            .entry(fields.score.clone())
            .or_insert_with(|| candidate["score"].clone());
    }
    if let Some(address) = candidate["address"].as_str() {
        props
            .entry(fields.match_address.clone())
            .or_insert_with(|| json!(address));
    }
    props
}

fn field_names(list: &Value) -> Vec<String> {
    list.as_array()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_metadata(body: &Value) -> ServiceMetadata {
    let props = &body["locatorProperties"];
    let suggested = props["SuggestedBatchSize"]
        .as_u64()
        .or_else(|| props["MaxBatchSize"].as_u64())
        .map(|n| n as usize);

    ServiceMetadata {
        suggested_batch_size: suggested,
        address_fields: field_names(&body["addressFields"]),
        single_line_field: body["singleLineAddressField"]["name"]
            .as_str()
            .map(String::from),
        result_fields: field_names(&body["candidateFields"]),
    }
}

impl GeocodeTransport for RestTransport {
    fn find_candidates(&self, request: &GeocodeRequest) -> Result<Vec<PropertySet>, TransportError> {
        let mut params: Vec<(&str, String)> = vec![("outFields", "*".to_string())];
        if let Some(max) = request.max_locations {
            params.push(("maxLocations", max.to_string()));
        }
        params.extend(
            request
                .attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.clone())),
        );

        let body = self.get_json(self.endpoint(Some("findAddressCandidates"), &params)?)?;
        check_service_error(&body)?;

        Ok(body["candidates"]
            .as_array()
            .map(|candidates| {
                candidates
                    .iter()
                    .map(|c| flatten_candidate(c, &self.response))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn geocode_batch(&self, records: &RecordSet) -> Result<RecordSet, TransportError> {
        let payload = json!({
            "records": records
                .iter()
                .map(|row| json!({ "attributes": row }))
                .collect::<Vec<_>>()
        });

        let url = self.endpoint(Some("geocodeAddresses"), &[])?;
        let body = self.post_form(url, &[("addresses", payload.to_string())])?;
        check_service_error(&body)?;

        Ok(body["locations"]
            .as_array()
            .map(|locations| {
                locations
                    .iter()
                    .map(|c| flatten_candidate(c, &self.response))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn reverse_geocode(&self, request: &ReverseGeocodeRequest) -> Result<PropertySet, TransportError> {
        let meters = request.distance_unit.to_meters(request.search_distance);
        let params = [
            (
                "location",
                format!("{},{}", request.location.x(), request.location.y()),
            ),
            ("distance", meters.to_string()),
        ];

        let body = self.get_json(self.endpoint(Some("reverseGeocode"), &params)?)?;
        if is_not_found(&body) {
            return Ok(PropertySet::new());
        }
        check_service_error(&body)?;

        let mut props = body["address"].as_object().cloned().unwrap_or_default();
        if !props.is_empty() && body["location"].is_object() {
            props.insert(self.response.shape.clone(), body["location"].clone());
        }
        Ok(props)
    }

    fn metadata(&self) -> Result<ServiceMetadata, TransportError> {
        let body = self.get_json(self.endpoint(None, &[])?)?;
        check_service_error(&body)?;
        Ok(parse_metadata(&body))
    }
}
