//! A downstream runner: OpenAPI pet store containers plus mock-server tests.
//!
//! ```text
//! cargo run --example petstore -- --image openapi-petstore:latest -v 2
//! cargo run --example petstore -- -f mock --reports --report-dir target/reports
//! ```

use std::any::Any;
use std::process;

use clap::Args;
use itkit::container::{self, Container, ContainerFixture, ContainerSpec, DockerRuntime};
use itkit::errors::{HarnessError, HarnessResult};
use itkit::{IntegrationTestCase, IntegrationTestRunner, PollConfig, Settings, TestSuite, UserArgs};
use itkit_mock::{GET, ResponseInfo, ServerConfig, ServerResponses};
use serde_json::json;

const TEST_PETSTORE_IMAGE: &str = "TEST_PETSTORE_IMAGE";
const IMAGE_BASE_NAME: &str = "openapi-petstore";
const REST_PORT: u16 = 8080;

// ============================================================================
// Fixture
// ============================================================================

struct PetStore {
    container: Container,
}

impl PetStore {
    /// `rest_port` 0 asks for an ephemeral host port.
    fn new(case: &mut IntegrationTestCase, name: &str, image: &str, rest_port: u16) -> HarnessResult<Self> {
        let spec = ContainerSpec::new(case.full_name(name), image).with_port(REST_PORT, Some(rest_port));
        let container = Container::new("PetStore", spec, case.runtime()?).with_settings(case.settings());
        Ok(Self { container })
    }

    fn address(&self) -> HarnessResult<String> {
        self.container
            .host_addr_for_port(REST_PORT)
            .ok_or_else(|| HarnessError::Failed(format!("{} has no REST port", self.container.name())))
    }
}

impl ContainerFixture for PetStore {
    fn container(&self) -> &Container {
        &self.container
    }

    fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    fn info(&self) -> String {
        self.address().unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn image_name(case: &mut IntegrationTestCase) -> HarnessResult<String> {
    if let Some(image) = case.settings().var(TEST_PETSTORE_IMAGE) {
        return Ok(image);
    }
    let runtime = case.runtime()?;
    container::last_built(runtime.as_ref(), IMAGE_BASE_NAME)?
        .ok_or_else(|| HarnessError::skip(format!("no {IMAGE_BASE_NAME} image; pass --image")))
}

// ============================================================================
// Basic suite
// ============================================================================

fn basic_setup(case: &mut IntegrationTestCase) -> HarnessResult<()> {
    if !DockerRuntime::connect().is_ok_and(|docker| docker.available()) {
        return Err(HarnessError::skip("Docker is not available"));
    }
    let image = image_name(case)?;
    for name in ["petstore-a", "petstore-b"] {
        let store = PetStore::new(case, name, &image, 0)?;
        case.start_container(store)?;
    }
    case.wait_for_ready(&["petstore"], PollConfig::default(), Some("pet stores"))
}

fn test_basic_user(case: &mut IntegrationTestCase) -> HarnessResult<()> {
    let user = json!({
        "firstName": "Test",
        "lastName": "User",
        "password": "abc123",
        "userStatus": 99,
        "phone": "5550100",
        "id": 0,
        "email": "test.user@example.com",
        "username": "testuser",
    });

    let addresses: Vec<String> = case
        .containers_of::<PetStore>()
        .iter()
        .map(|store| store.address())
        .collect::<HarnessResult<_>>()?;

    for addr in addresses {
        let base_url = format!("http://{addr}/v3");
        let resp = case.request("POST", &format!("{base_url}/user"), Some(&user))?;
        assert_eq!(resp.status().as_u16(), 200);

        let resp = case.request("GET", &format!("{base_url}/user/testuser"), None)?;
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.json::<serde_json::Value>()?, user);
    }
    Ok(())
}

// ============================================================================
// Mock server suite
// ============================================================================

const SIMPLE_URL: &str = "sna/foo";

fn mock_setup(case: &mut IntegrationTestCase) -> HarnessResult<()> {
    case.start_mock_server(ServerConfig::default())?;
    Ok(())
}

fn base_url(case: &IntegrationTestCase) -> HarnessResult<String> {
    case.mock_servers()
        .first()
        .map(|server| server.base_url())
        .ok_or_else(|| HarnessError::Failed("mock server is not running".to_string()))
}

fn test_mock_no_data(case: &mut IntegrationTestCase) -> HarnessResult<()> {
    let resp = case.request("GET", &format!("{}/some_url", base_url(case)?), None)?;
    assert_eq!(resp.status().as_u16(), 404);
    Ok(())
}

fn test_mock_simple_json(case: &mut IntegrationTestCase) -> HarnessResult<()> {
    let mut responses = ServerResponses::new("");
    responses.add_response(SIMPLE_URL, GET, ResponseInfo::json(json!({"foo": "bar"})).with_content_type(None));
    case.mock_servers()[0].set_response_data(responses.for_server());

    let resp = case.request("GET", &format!("{}/{SIMPLE_URL}", base_url(case)?), None)?;
    assert_eq!(resp.status().as_u16(), 200);
    let content_type = resp.headers().get("content-type").and_then(|v| v.to_str().ok()).map(str::to_string);
    assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
    assert_eq!(resp.json::<serde_json::Value>()?, json!({"foo": "bar"}));
    Ok(())
}

fn test_mock_simple_text(case: &mut IntegrationTestCase) -> HarnessResult<()> {
    let mut responses = ServerResponses::new("");
    responses.add_response(
        SIMPLE_URL,
        GET,
        ResponseInfo::json("random string").with_content_type(Some("text/plain")),
    );
    case.mock_servers()[0].set_response_data(responses.for_server());

    let result = case.curl("GET", &format!("{}/{SIMPLE_URL}", base_url(case)?), None, None);
    case.assert_result_success(&result, Some("random string"));
    assert_eq!(result.out(), "\"random string\"");
    Ok(())
}

// ============================================================================
// Runner
// ============================================================================

#[derive(Debug, Clone, Args)]
struct PetStoreArgs {
    /// PetStore image name
    #[arg(short = 'i', long = "image")]
    image_name: Option<String>,
}

impl UserArgs for PetStoreArgs {
    fn process_user_args(&self, settings: &mut Settings) -> HarnessResult<()> {
        if let Some(image) = &self.image_name {
            settings.set_var(TEST_PETSTORE_IMAGE, image.clone());
        }
        Ok(())
    }
}

fn main() {
    let mut runner = IntegrationTestRunner::<PetStoreArgs>::new("PetStore integration test runner")
        .suite(
            TestSuite::new("test_basic.TestBasic", "demos/test_basic.rs")
                .set_up(basic_setup)
                .test("test_basic_user", line!(), test_basic_user),
        )
        .suite(
            TestSuite::new("test_mock_server.TestMockServer", "demos/test_mock_server.rs")
                .set_up(mock_setup)
                .test("test_mock_no_data", line!(), test_mock_no_data)
                .test("test_mock_simple_json", line!(), test_mock_simple_json)
                .test("test_mock_simple_text", line!(), test_mock_simple_text),
        );
    process::exit(runner.run_from_env());
}
