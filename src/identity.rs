//! Identities and permission statements
//!
//! Every trust boundary in the topology gets its own identity: cluster
//! administration, pod execution, the ingress controller, and the build
//! pipeline. Each identity carries a policy document composed from
//! permission statements. Statements are additive and order-preserving:
//! the composer never merges, deduplicates, or drops a statement, and an
//! empty action list or resource scope is a configuration error rather
//! than a silent allow-all or deny-all.
//!
//! The ingress controller's statement blocks live in a declarative table
//! ([`INGRESS_STATEMENT_BLOCKS`]) instead of inline literals, so the
//! composed policy can be audited block by block.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Effect of a permission statement
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum PolicyEffect {
    /// The statement grants the listed actions
    #[default]
    Allow,
    /// The statement denies the listed actions
    Deny,
}

/// One allow/deny rule naming a set of actions and a resource scope
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatement {
    /// Statement identifier, used for auditing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Allowed or denied API actions
    pub actions: Vec<String>,
    /// Resource scope the actions apply to
    pub resources: Vec<String>,
    /// Allow or deny
    #[serde(default)]
    pub effect: PolicyEffect,
}

impl PolicyStatement {
    /// Create an allow statement over the given actions and resources
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            sid: None,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            effect: PolicyEffect::Allow,
        }
    }

    /// Attach a statement identifier
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Validate the statement
    ///
    /// An empty action list or resource scope is a configuration error -
    /// it must never degrade into an implicit allow-all or deny-all.
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(Error::validation(format!(
                "policy statement {} has an empty action list",
                self.sid.as_deref().unwrap_or("<unnamed>")
            )));
        }
        if self.resources.is_empty() {
            return Err(Error::validation(format!(
                "policy statement {} has an empty resource scope",
                self.sid.as_deref().unwrap_or("<unnamed>")
            )));
        }
        if self.actions.iter().any(|a| a.is_empty()) {
            return Err(Error::validation("policy statement contains an empty action"));
        }
        Ok(())
    }
}

/// An ordered, additive collection of permission statements
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Create an empty policy document
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement, validating it first
    ///
    /// Statements are preserved verbatim in declaration order.
    pub fn push(&mut self, statement: PolicyStatement) -> Result<()> {
        statement.validate()?;
        self.statements.push(statement);
        Ok(())
    }

    /// Append every statement from an iterator
    pub fn extend<I: IntoIterator<Item = PolicyStatement>>(&mut self, statements: I) -> Result<()> {
        for statement in statements {
            self.push(statement)?;
        }
        Ok(())
    }

    /// The composed statements, in declaration order
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Number of statements in the document
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the document has no statements
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Principal allowed to assume an identity
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Principal {
    /// The account's root principal (human administration)
    AccountRoot,
    /// A cloud service principal, e.g. the serverless pod scheduler
    Service(String),
}

/// An identity: who may assume it, and what it may do
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Role name
    pub name: String,
    /// Principal that may assume the role
    pub assumed_by: Principal,
    /// Provider-managed policy attachments, by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<String>,
    /// Inline policy document composed from permission statements
    #[serde(default, skip_serializing_if = "PolicyDocument::is_empty")]
    pub policy: PolicyDocument,
}

impl RoleSpec {
    /// Create a role with an empty policy document
    pub fn new(name: impl Into<String>, assumed_by: Principal) -> Self {
        Self {
            name: name.into(),
            assumed_by,
            managed_policies: Vec::new(),
            policy: PolicyDocument::new(),
        }
    }

    /// Attach a provider-managed policy by name
    pub fn with_managed_policy(mut self, name: impl Into<String>) -> Self {
        self.managed_policies.push(name.into());
        self
    }

    /// Append a statement to the inline policy document
    pub fn attach(mut self, statement: PolicyStatement) -> Result<Self> {
        self.policy.push(statement)?;
        Ok(self)
    }
}

// =============================================================================
// Ingress controller statement blocks
// =============================================================================

/// Statement blocks granted to the ingress controller identity
///
/// One block per upstream API family the controller programs: certificates,
/// network, load balancers, identity, federated login, regional firewall,
/// tagging, legacy firewall, firewall v2, and DoS protection. Each block is
/// scoped to `*`, matching the upstream controller's published policy.
pub const INGRESS_STATEMENT_BLOCKS: &[(&str, &[&str])] = &[
    (
        "certificates",
        &[
            "acm:DescribeCertificate",
            "acm:ListCertificates",
            "acm:GetCertificate",
        ],
    ),
    (
        "network",
        &[
            "ec2:AuthorizeSecurityGroupIngress",
            "ec2:CreateSecurityGroup",
            "ec2:CreateTags",
            "ec2:DeleteTags",
            "ec2:DeleteSecurityGroup",
            "ec2:DescribeAccountAttributes",
            "ec2:DescribeAddresses",
            "ec2:DescribeInstances",
            "ec2:DescribeInstanceStatus",
            "ec2:DescribeInternetGateways",
            "ec2:DescribeNetworkInterfaces",
            "ec2:DescribeSecurityGroups",
            "ec2:DescribeSubnets",
            "ec2:DescribeTags",
            "ec2:DescribeVpcs",
            "ec2:ModifyInstanceAttribute",
            "ec2:ModifyNetworkInterfaceAttribute",
            "ec2:RevokeSecurityGroupIngress",
        ],
    ),
    (
        "load-balancer",
        &[
            "elasticloadbalancing:AddListenerCertificates",
            "elasticloadbalancing:AddTags",
            "elasticloadbalancing:CreateListener",
            "elasticloadbalancing:CreateLoadBalancer",
            "elasticloadbalancing:CreateRule",
            "elasticloadbalancing:CreateTargetGroup",
            "elasticloadbalancing:DeleteListener",
            "elasticloadbalancing:DeleteLoadBalancer",
            "elasticloadbalancing:DeleteRule",
            "elasticloadbalancing:DeleteTargetGroup",
            "elasticloadbalancing:DeregisterTargets",
            "elasticloadbalancing:DescribeListenerCertificates",
            "elasticloadbalancing:DescribeListeners",
            "elasticloadbalancing:DescribeLoadBalancers",
            "elasticloadbalancing:DescribeLoadBalancerAttributes",
            "elasticloadbalancing:DescribeRules",
            "elasticloadbalancing:DescribeSSLPolicies",
            "elasticloadbalancing:DescribeTags",
            "elasticloadbalancing:DescribeTargetGroups",
            "elasticloadbalancing:DescribeTargetGroupAttributes",
            "elasticloadbalancing:DescribeTargetHealth",
            "elasticloadbalancing:ModifyListener",
            "elasticloadbalancing:ModifyLoadBalancerAttributes",
            "elasticloadbalancing:ModifyRule",
            "elasticloadbalancing:ModifyTargetGroup",
            "elasticloadbalancing:ModifyTargetGroupAttributes",
            "elasticloadbalancing:RegisterTargets",
            "elasticloadbalancing:RemoveListenerCertificates",
            "elasticloadbalancing:RemoveTags",
            "elasticloadbalancing:SetIpAddressType",
            "elasticloadbalancing:SetSecurityGroups",
            "elasticloadbalancing:SetSubnets",
            "elasticloadbalancing:SetWebAcl",
        ],
    ),
    (
        "identity",
        &[
            "iam:CreateServiceLinkedRole",
            "iam:GetServerCertificate",
            "iam:ListServerCertificates",
        ],
    ),
    ("federated-login", &["cognito-idp:DescribeUserPoolClient"]),
    (
        "firewall-regional",
        &[
            "waf-regional:GetWebACLForResource",
            "waf-regional:GetWebACL",
            "waf-regional:AssociateWebACL",
            "waf-regional:DisassociateWebACL",
        ],
    ),
    ("tagging", &["tag:GetResources", "tag:TagResources"]),
    ("firewall-legacy", &["waf:GetWebACL"]),
    (
        "firewall-v2",
        &[
            "wafv2:GetWebACL",
            "wafv2:GetWebACLForResource",
            "wafv2:AssociateWebACL",
            "wafv2:DisassociateWebACL",
        ],
    ),
    (
        "dos-protection",
        &[
            "shield:DescribeProtection",
            "shield:GetSubscriptionState",
            "shield:DeleteProtection",
            "shield:CreateProtection",
            "shield:DescribeSubscription",
            "shield:ListProtections",
        ],
    ),
];

/// Statements for the ingress controller identity, one per declared block
pub fn ingress_controller_statements() -> Vec<PolicyStatement> {
    INGRESS_STATEMENT_BLOCKS
        .iter()
        .map(|(sid, actions)| {
            PolicyStatement::allow(actions.iter().copied(), ["*"]).with_sid(*sid)
        })
        .collect()
}

/// Policy document for the ingress controller identity
pub fn ingress_controller_policy() -> Result<PolicyDocument> {
    let mut policy = PolicyDocument::new();
    policy.extend(ingress_controller_statements())?;
    Ok(policy)
}

// =============================================================================
// Role catalog
// =============================================================================

/// Administrative identity for the cluster, assumable by the account root
pub fn cluster_admin(name: impl Into<String>) -> RoleSpec {
    RoleSpec::new(name, Principal::AccountRoot)
}

/// Execution identity for serverless pods
///
/// Carries both the provider-managed policy attachments and the inline
/// metrics/log-delivery statements. Both mechanisms are preserved
/// deliberately; see DESIGN.md.
pub fn pod_execution(name: impl Into<String>) -> Result<RoleSpec> {
    RoleSpec::new(
        name,
        Principal::Service("eks-fargate-pods.amazonaws.com".to_string()),
    )
    .with_managed_policy("AmazonEKSFargatePodExecutionRolePolicy")
    .with_managed_policy("CloudWatchAgentServerPolicy")
    .attach(PolicyStatement::allow(["sdkmetrics:*"], ["*"]).with_sid("sdk-metrics"))?
    .attach(
        PolicyStatement::allow(
            [
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
                "logs:DescribeLogStreams",
            ],
            ["*"],
        )
        .with_sid("log-delivery"),
    )
}

/// Identity the build project runs as
///
/// Push/pull on the registry repository, plus read access to the cluster
/// endpoint so the post-build phase can patch the running deployment. The
/// resource scopes are late-bound: they reference outputs of the repository
/// and cluster resources.
pub fn build_project(name: impl Into<String>) -> Result<RoleSpec> {
    RoleSpec::new(name, Principal::Service("codebuild.amazonaws.com".to_string()))
        .attach(
            PolicyStatement::allow(["ecr:GetAuthorizationToken"], ["*"])
                .with_sid("registry-login"),
        )?
        .attach(
            PolicyStatement::allow(
                [
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:BatchGetImage",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:PutImage",
                    "ecr:InitiateLayerUpload",
                    "ecr:UploadLayerPart",
                    "ecr:CompleteLayerUpload",
                ],
                ["${repository.arn}"],
            )
            .with_sid("registry-push-pull"),
        )?
        .attach(
            PolicyStatement::allow(["eks:DescribeCluster"], ["${cluster.arn}"])
                .with_sid("cluster-describe"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_policy_is_exact_union_of_blocks() {
        let policy = ingress_controller_policy().expect("blocks should compose");

        assert_eq!(policy.len(), INGRESS_STATEMENT_BLOCKS.len());
        for (statement, (sid, actions)) in
            policy.statements().iter().zip(INGRESS_STATEMENT_BLOCKS)
        {
            assert_eq!(statement.sid.as_deref(), Some(*sid));
            assert_eq!(statement.effect, PolicyEffect::Allow);
            assert_eq!(statement.resources, vec!["*"]);
            let expected: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
            assert_eq!(statement.actions, expected, "block {sid} must be verbatim");
        }
    }

    #[test]
    fn no_statement_is_merged_or_deduplicated() {
        // Two blocks share the GetWebACL action under different prefixes;
        // the composer must keep them as distinct statements.
        let policy = ingress_controller_policy().unwrap();
        let firewall_blocks: Vec<_> = policy
            .statements()
            .iter()
            .filter(|s| s.sid.as_deref().map(|sid| sid.starts_with("firewall")) == Some(true))
            .collect();
        assert_eq!(firewall_blocks.len(), 3);
    }

    #[test]
    fn empty_actions_rejected() {
        let statement = PolicyStatement {
            sid: Some("broken".to_string()),
            actions: vec![],
            resources: vec!["*".to_string()],
            effect: PolicyEffect::Allow,
        };
        let err = statement.validate().unwrap_err();
        assert!(err.to_string().contains("empty action list"));
    }

    #[test]
    fn empty_resources_rejected() {
        let statement = PolicyStatement {
            sid: None,
            actions: vec!["acm:ListCertificates".to_string()],
            resources: vec![],
            effect: PolicyEffect::Allow,
        };
        assert!(statement.validate().is_err());
    }

    #[test]
    fn document_rejects_invalid_statement() {
        let mut policy = PolicyDocument::new();
        let bad = PolicyStatement::allow(Vec::<String>::new(), ["*"]);
        assert!(policy.push(bad).is_err());
        assert!(policy.is_empty());
    }

    #[test]
    fn statements_preserve_declaration_order() {
        let mut policy = PolicyDocument::new();
        policy
            .push(PolicyStatement::allow(["b:Second"], ["*"]).with_sid("second"))
            .unwrap();
        policy
            .push(PolicyStatement::allow(["a:First"], ["*"]).with_sid("first"))
            .unwrap();
        let sids: Vec<_> = policy
            .statements()
            .iter()
            .map(|s| s.sid.as_deref().unwrap())
            .collect();
        assert_eq!(sids, vec!["second", "first"]);
    }

    #[test]
    fn pod_execution_keeps_both_mechanisms() {
        let role = pod_execution("pod-role").unwrap();
        assert_eq!(role.managed_policies.len(), 2);
        assert_eq!(role.policy.len(), 2);
        assert_eq!(
            role.assumed_by,
            Principal::Service("eks-fargate-pods.amazonaws.com".to_string())
        );
    }

    #[test]
    fn build_role_scopes_to_late_bound_resources() {
        let role = build_project("build-role").unwrap();
        let push = role
            .policy
            .statements()
            .iter()
            .find(|s| s.sid.as_deref() == Some("registry-push-pull"))
            .unwrap();
        assert_eq!(push.resources, vec!["${repository.arn}"]);
        let describe = role
            .policy
            .statements()
            .iter()
            .find(|s| s.sid.as_deref() == Some("cluster-describe"))
            .unwrap();
        assert_eq!(describe.resources, vec!["${cluster.arn}"]);
    }
}
