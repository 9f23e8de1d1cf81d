//! Workflow spec assembly
//!
//! Builds the full Argo workflow spec for one experiment run: a weekly
//! loop over the training window, one plan fan-out per week running the
//! algorithm's steps in order, and a finalize step that marks the run
//! `Finished` in the orchestration store.

use chrono::NaiveDate;
use sigex_core::{AlgorithmStep, DomainError};

use super::contract::{
    Arguments, ConfigMapRef, Container, EnvVar, Parameter, PodGc, ResourceAmounts, Resources, Step,
    Template, Volume, VolumeMount, WorkflowSpec,
};
use super::dates::WeeklyDates;
use crate::trials_config::TRIALS_FILE_NAME;

pub const TRIALS_VOLUME_NAME: &str = "trials-cm";
pub const TRIALS_MOUNT_PATH: &str = "/config/trials";

const ENTRYPOINT: &str = "loop-params";
const PLAN_TEMPLATE: &str = "plan";
const FINALIZE_TEMPLATE: &str = "finalize";
const DATE_LIST_PARAM: &str = "date-list";
const WEEK_DATE_PARAM: &str = "previousWeekEndDate";

/// Connection the finalize container uses to flip the run's status.
#[derive(Debug, Clone)]
pub struct FinalizeTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for FinalizeTarget {
    fn default() -> Self {
        Self {
            host: "risingwave.risingwave.svc.cluster.local".to_string(),
            port: 4567,
            database: "dev".to_string(),
            user: "root".to_string(),
            password: "root".to_string(),
        }
    }
}

pub struct WorkflowSpecInput<'a> {
    pub run_id: &'a str,
    pub steps: &'a [AlgorithmStep],
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub number_of_weeks_historical_data: u32,
    pub number_of_cpu_cores_requested: i32,
    pub tickers_raw: Option<&'a str>,
    pub tickers_preset: Option<&'a str>,
    pub env_vars: &'a [(String, String)],
    pub config_map_name: &'a str,
    /// How long finished pods linger before garbage collection.
    pub gc_delete_delay: &'a str,
    pub finalize: &'a FinalizeTarget,
}

/// Assembles the workflow spec as a JSON document.
///
/// Identical input produces an identical document. Optional fields that
/// are unset are omitted entirely, never serialized as `null`.
///
/// # Errors
/// `DomainError::Precondition` when the training window is not a valid
/// weekly range.
pub fn build_workflow_spec(input: &WorkflowSpecInput<'_>) -> sigex_core::Result<serde_json::Value> {
    let date_list = render_date_list(input.start, input.end)?;

    let mut templates = Vec::with_capacity(3 + input.steps.len());
    templates.push(finalize_template(input.run_id, input.finalize));
    templates.push(loop_template());
    templates.push(plan_template(input.steps));
    templates.extend(input.steps.iter().map(|step| step_template(step, input)));

    let spec = WorkflowSpec {
        entrypoint: ENTRYPOINT.to_string(),
        arguments: Arguments {
            parameters: vec![Parameter {
                name: DATE_LIST_PARAM.to_string(),
                value: Some(date_list),
            }],
        },
        templates,
        pod_gc: PodGc {
            strategy: "OnWorkflowSuccess".to_string(),
            delete_delay_duration: input.gc_delete_delay.to_string(),
        },
    };

    serde_json::to_value(&spec).map_err(|err| DomainError::Infrastructure(err.to_string()))
}

/// JSON-string of `[{"previousWeekEndDate":"YYYY-MM-DD"}, …]`, one entry
/// per week in the inclusive window.
fn render_date_list(start: NaiveDate, end: NaiveDate) -> sigex_core::Result<String> {
    let entries: Vec<serde_json::Value> = WeeklyDates::new(start, end)?
        .map(|date| serde_json::json!({ WEEK_DATE_PARAM: date.format("%Y-%m-%d").to_string() }))
        .collect();
    serde_json::to_string(&entries).map_err(|err| DomainError::Infrastructure(err.to_string()))
}

fn finalize_template(run_id: &str, target: &FinalizeTarget) -> Template {
    let env = [
        ("PGHOST", target.host.clone()),
        ("PGPORT", target.port.to_string()),
        ("PGDATABASE", target.database.clone()),
        ("PGUSER", target.user.clone()),
        ("PGPASSWORD", target.password.clone()),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value),
    })
    .collect();

    Template {
        name: FINALIZE_TEMPLATE.to_string(),
        parallelism: None,
        inputs: None,
        steps: None,
        container: Some(Container {
            image: "postgres:15".to_string(),
            resources: None,
            volume_mounts: None,
            env: Some(env),
            command: Some(vec!["sh".to_string(), "-c".to_string()]),
            args: Some(vec![format!(
                "psql -c \"UPDATE orchestration.signal_generator_experiment_runs \
                 SET status = 'Finished' where id = '{run_id}'\""
            )]),
        }),
        volumes: None,
    }
}

fn loop_template() -> Template {
    Template {
        name: ENTRYPOINT.to_string(),
        parallelism: Some(1),
        inputs: Some(single_parameter_inputs(DATE_LIST_PARAM)),
        steps: Some(vec![vec![
            Step {
                name: PLAN_TEMPLATE.to_string(),
                template: PLAN_TEMPLATE.to_string(),
                arguments: Some(week_date_arguments("{{item.previousWeekEndDate}}")),
                with_param: Some(format!("{{{{inputs.parameters.{DATE_LIST_PARAM}}}}}")),
            },
            Step {
                name: FINALIZE_TEMPLATE.to_string(),
                template: FINALIZE_TEMPLATE.to_string(),
                arguments: None,
                with_param: None,
            },
        ]]),
        container: None,
        volumes: None,
    }
}

/// One step group per algorithm step keeps the groups sequential; within
/// a group Argo would run steps in parallel.
fn plan_template(steps: &[AlgorithmStep]) -> Template {
    let groups = steps
        .iter()
        .map(|step| {
            vec![Step {
                name: step.name.clone(),
                template: step.name.clone(),
                arguments: Some(week_date_arguments(
                    "{{inputs.parameters.previousWeekEndDate}}",
                )),
                with_param: None,
            }]
        })
        .collect();

    Template {
        name: PLAN_TEMPLATE.to_string(),
        parallelism: Some(1),
        inputs: Some(single_parameter_inputs(WEEK_DATE_PARAM)),
        steps: Some(groups),
        container: None,
        volumes: None,
    }
}

fn step_template(step: &AlgorithmStep, input: &WorkflowSpecInput<'_>) -> Template {
    let mut env = vec![
        EnvVar {
            name: "Experiment__PreviousPeriodEndDateLocal".to_string(),
            value: Some("{{inputs.parameters.previousWeekEndDate}}".to_string()),
        },
        EnvVar {
            name: "Experiment__TickersRaw".to_string(),
            value: input.tickers_raw.map(str::to_string),
        },
        EnvVar {
            name: "Experiment__TickersPreset".to_string(),
            value: input.tickers_preset.map(str::to_string),
        },
        EnvVar {
            name: "Experiment__Training__NumberOfWeeksHistoricalData".to_string(),
            value: Some(input.number_of_weeks_historical_data.to_string()),
        },
        EnvVar {
            name: "TRIALS_CONFIG_LOCATION".to_string(),
            value: Some(format!("{TRIALS_MOUNT_PATH}/{TRIALS_FILE_NAME}")),
        },
    ];
    env.extend(input.env_vars.iter().map(|(name, value)| EnvVar {
        name: name.clone(),
        value: Some(value.clone()),
    }));

    Template {
        name: step.name.clone(),
        parallelism: None,
        inputs: Some(single_parameter_inputs(WEEK_DATE_PARAM)),
        steps: None,
        container: Some(Container {
            image: step.image_ref(),
            resources: Some(Resources {
                limits: None,
                requests: Some(ResourceAmounts {
                    cpu: input.number_of_cpu_cores_requested.to_string(),
                }),
            }),
            volume_mounts: Some(vec![VolumeMount {
                name: TRIALS_VOLUME_NAME.to_string(),
                mount_path: TRIALS_MOUNT_PATH.to_string(),
                read_only: true,
            }]),
            env: Some(env),
            command: step.commands.clone(),
            args: step.args.clone(),
        }),
        volumes: Some(vec![Volume {
            name: TRIALS_VOLUME_NAME.to_string(),
            config_map: ConfigMapRef {
                name: input.config_map_name.to_string(),
            },
        }]),
    }
}

fn single_parameter_inputs(name: &str) -> Arguments {
    Arguments {
        parameters: vec![Parameter {
            name: name.to_string(),
            value: None,
        }],
    }
}

fn week_date_arguments(value: &str) -> Arguments {
    Arguments {
        parameters: vec![Parameter {
            name: WEEK_DATE_PARAM.to_string(),
            value: Some(value.to_string()),
        }],
    }
}
