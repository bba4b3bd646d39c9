//! EC2 implementation of [`ComputeGateway`].

use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_ec2::types::{
    Filter, IamInstanceProfileSpecification, InstanceType, RequestSpotLaunchSpecification,
    SpotPlacement,
};
use aws_smithy_types::DateTime;

use crate::bootstrap;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{ComputeGateway, InstanceRequest, InstanceState, SpotPrice};

/// Spot price product filter.
const PRODUCT_DESCRIPTION: &str = "Linux/UNIX";

/// Error codes meaning the instance no longer exists.
const NOT_FOUND_CODES: [&str; 2] = ["InvalidInstanceID.NotFound", "InvalidInstanceID.Malformed"];

/// Launch parameters shared by every spot request.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Machine image with the worker binary installed.
    pub image_id: String,
    /// IAM instance profile granting the instance its role.
    pub instance_profile_arn: Option<String>,
    pub security_group_ids: Vec<String>,
}

/// [`ComputeGateway`] backed by the EC2 API.
#[derive(Clone)]
pub struct Ec2Gateway {
    client: aws_sdk_ec2::Client,
    launch: LaunchSpec,
}

impl Ec2Gateway {
    pub fn new(client: aws_sdk_ec2::Client, launch: LaunchSpec) -> Self {
        Self { client, launch }
    }

    /// Build a client from the ambient AWS configuration (env vars,
    /// profile, instance role), overriding the region when given.
    pub async fn from_env(region: Option<String>, launch: LaunchSpec) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::new(aws_sdk_ec2::Client::new(&sdk_config), launch)
    }
}

fn api_error<E>(operation: &'static str, err: E) -> GatewayError
where
    E: std::error::Error,
{
    GatewayError::Api {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

#[async_trait]
impl ComputeGateway for Ec2Gateway {
    async fn describe_spot_prices(
        &self,
        zones: &[String],
        instance_type: &str,
    ) -> GatewayResult<Vec<SpotPrice>> {
        let output = self
            .client
            .describe_spot_price_history()
            .filters(
                Filter::builder()
                    .name("availability-zone")
                    .set_values(Some(zones.to_vec()))
                    .build(),
            )
            .instance_types(InstanceType::from(instance_type))
            .product_descriptions(PRODUCT_DESCRIPTION)
            .start_time(DateTime::from(SystemTime::now()))
            .send()
            .await
            .map_err(|e| api_error("DescribeSpotPriceHistory", e))?;

        let prices = output
            .spot_price_history()
            .iter()
            .filter_map(|entry| {
                let zone = entry.availability_zone()?;
                let price = entry.spot_price()?.parse::<f64>().ok()?;
                Some(SpotPrice {
                    zone: zone.to_string(),
                    price,
                })
            })
            .collect();

        Ok(prices)
    }

    async fn request_instance(&self, request: &InstanceRequest) -> GatewayResult<String> {
        let mut spec = RequestSpotLaunchSpecification::builder()
            .image_id(&self.launch.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .placement(
                SpotPlacement::builder()
                    .availability_zone(&request.zone)
                    .build(),
            )
            .set_security_group_ids(Some(self.launch.security_group_ids.clone()))
            .user_data(bootstrap::encode(&request.bootstrap));
        if let Some(arn) = &self.launch.instance_profile_arn {
            spec = spec
                .iam_instance_profile(IamInstanceProfileSpecification::builder().arn(arn).build());
        }

        let output = self
            .client
            .request_spot_instances()
            .instance_count(1)
            .valid_until(DateTime::from(SystemTime::now() + request.valid_for))
            .launch_specification(spec.build())
            .send()
            .await
            .map_err(|e| api_error("RequestSpotInstances", e))?;

        output
            .spot_instance_requests()
            .first()
            .and_then(|r| r.spot_instance_request_id())
            .map(str::to_string)
            .ok_or(GatewayError::UnexpectedResponse {
                operation: "RequestSpotInstances",
                message: "no spot instance request returned".to_string(),
            })
    }

    async fn describe_instance(&self, instance_id: &str) -> GatewayResult<InstanceState> {
        let output = match self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if err.code().is_some_and(|code| NOT_FOUND_CODES.contains(&code)) => {
                tracing::debug!(instance_id, "Instance unknown to EC2, treating as terminated");
                return Ok(InstanceState::Terminated);
            }
            Err(err) => return Err(api_error("DescribeInstances", err)),
        };

        let Some(instance) = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
        else {
            return Ok(InstanceState::Terminated);
        };

        let name = instance
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str())
            .unwrap_or_default();

        InstanceState::from_name(name).ok_or(GatewayError::UnexpectedResponse {
            operation: "DescribeInstances",
            message: format!("unknown instance state '{name}'"),
        })
    }

    async fn terminate_instance(&self, instance_id: &str) -> GatewayResult<()> {
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error("TerminateInstances", e))?;
        Ok(())
    }
}
