use serde::{Deserialize, Serialize};

use crate::api::task_dto::TaskRequestDto;

/// Input shape of a whole system model file: the node/resource directory,
/// the user/group tree, limits, notification definitions and an optional
/// list of bookings to admit at startup.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemModelDto {
    #[serde(default)]
    pub resources: Vec<ResourceDto>,
    #[serde(default)]
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub groups: Vec<GroupDto>,
    #[serde(default)]
    pub users: Vec<UserDto>,
    #[serde(default)]
    pub limits: Vec<LimitDto>,
    #[serde(default)]
    pub notifications: Vec<NotificationDto>,
    #[serde(default)]
    pub bookings: Vec<TaskRequestDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResourceUnitDto {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "Bytes (SI)")]
    BytesSi,
    #[serde(rename = "Bytes (IEC)")]
    BytesIec,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub unit: ResourceUnitDto,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NodeResourceDto {
    pub resource: String,
    pub amount: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub resources: Vec<NodeResourceDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupDto {
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub notifications: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub username: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: String,
    pub group: String,
    #[serde(default)]
    pub notifications: Vec<String>,
}

/// Exactly one of `user` / `group` must be set.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LimitDto {
    pub name: String,
    pub description: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub resource: String,
    pub nodes: Vec<String>,
    pub amount: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKindDto {
    TaskStart,
    TaskEnd,
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub name: String,
    pub description: Option<String>,
    pub kind: NotificationKindDto,
    #[serde(default)]
    pub time_offset_seconds: i64,
    pub template: Option<String>,
}
